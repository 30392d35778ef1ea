use std::collections::BTreeMap;
use std::sync::Arc;

use log::trace;
use thiserror::Error;

use crate::domain::{DataType, RecordDecl};
use crate::path::FieldPath;

/// Run-time value held by a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(Record),
}

impl Value {
    /// Name of the run-time type of the value, used in error messages.
    /// Records report the name of their declaration.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(record) => record.decl.name(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Instance of a [RecordDecl]: one value per declared field, in declaration order.
///
/// A record only ever holds values that conform to the declared field types.
/// Cloning it is a full deep copy; only the immutable declaration is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    decl: Arc<RecordDecl>,
    values: Vec<Value>,
}

impl Record {
    pub fn builder(decl: &Arc<RecordDecl>) -> RecordBuilder {
        RecordBuilder {
            decl: Arc::clone(decl),
            given: Vec::new(),
        }
    }

    pub fn decl(&self) -> &Arc<RecordDecl> {
        &self.decl
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.decl.position(field).map(|i| &self.values[i])
    }

    /// Iterate over `(field name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.decl
            .fields()
            .iter()
            .map(|field| field.name())
            .zip(self.values.iter())
    }

    /// Assemble a record from values already checked against `decl`.
    pub(crate) fn from_checked(decl: Arc<RecordDecl>, values: Vec<Value>) -> Self {
        debug_assert_eq!(decl.fields().len(), values.len());
        Self { decl, values }
    }

    /// Current value at the path.
    pub fn resolve(&self, path: &FieldPath) -> Result<&Value, ResolveError> {
        self.lookup(path.segments()).map(|(value, _)| value)
    }

    /// Declared type of the field the path addresses.
    ///
    /// Intermediate segments must exist in this instance. For a map the
    /// terminal key does not have to be present, as assigning to it inserts.
    pub fn declared_type(&self, path: &FieldPath) -> Result<&DataType, ResolveError> {
        let (parent, terminal) = path.segments().split_at(path.len() - 1);
        let terminal = &terminal[0];
        if parent.is_empty() {
            return self.field_type(terminal);
        }

        let (value, ty) = self.lookup(parent)?;
        match value {
            Value::Record(record) => record.field_type(terminal),
            Value::Map(_) => ty.map_value().ok_or_else(|| ResolveError::NotAContainer {
                segment: parent[parent.len() - 1].clone(),
                found: ty.to_string(),
            }),
            other => Err(ResolveError::NotAContainer {
                segment: parent[parent.len() - 1].clone(),
                found: other.type_name().to_owned(),
            }),
        }
    }

    /// Type-check the value against the declared type at the path and store it.
    pub fn assign(&mut self, path: &FieldPath, value: Value) -> Result<(), AssignError> {
        trace!("Assign `{path}` on `{}`", self.decl.name());
        self.assign_segments(path.segments(), value, path)
    }

    fn field_type(&self, field: &str) -> Result<&DataType, ResolveError> {
        self.decl
            .field(field)
            .map(|f| f.ty())
            .ok_or_else(|| self.not_found(field))
    }

    fn not_found(&self, segment: &str) -> ResolveError {
        ResolveError::FieldNotFound {
            segment: segment.to_owned(),
            record: self.decl.name().to_owned(),
        }
    }

    fn lookup(&self, segments: &[String]) -> Result<(&Value, &DataType), ResolveError> {
        let (head, rest) = segments
            .split_first()
            .ok_or(ResolveError::EmptyPath)?;
        let i = self.decl.position(head).ok_or_else(|| self.not_found(head))?;
        let mut value = &self.values[i];
        let mut ty = self.decl.fields()[i].ty();
        let mut previous = head;

        for segment in rest {
            (value, ty) = match value {
                Value::Record(record) => {
                    let i = record
                        .decl
                        .position(segment)
                        .ok_or_else(|| record.not_found(segment))?;
                    (&record.values[i], record.decl.fields()[i].ty())
                }
                Value::Map(entries) => {
                    let entry = entries.get(segment).ok_or_else(|| ResolveError::KeyNotFound {
                        segment: segment.clone(),
                        map: previous.clone(),
                    })?;
                    let value_ty = ty.map_value().ok_or_else(|| ResolveError::NotAContainer {
                        segment: previous.clone(),
                        found: ty.to_string(),
                    })?;
                    (entry, value_ty)
                }
                other => {
                    return Err(ResolveError::NotAContainer {
                        segment: previous.clone(),
                        found: other.type_name().to_owned(),
                    })
                }
            };
            previous = segment;
        }

        Ok((value, ty))
    }

    fn assign_segments(
        &mut self,
        segments: &[String],
        value: Value,
        path: &FieldPath,
    ) -> Result<(), AssignError> {
        let (head, rest) = segments.split_first().ok_or(ResolveError::EmptyPath)?;
        let i = self.decl.position(head).ok_or_else(|| self.not_found(head))?;
        let ty = self.decl.fields()[i].ty();

        if rest.is_empty() {
            self.values[i] = ty.check(value).map_err(|e| e.within(path))?;
            return Ok(());
        }

        assign_in(&mut self.values[i], ty, head, rest, value, path)
    }
}

/// Continue an assignment below `slot`, a value of declared type `ty`
/// reached through the segment `previous`.
fn assign_in(
    slot: &mut Value,
    ty: &DataType,
    previous: &str,
    segments: &[String],
    value: Value,
    path: &FieldPath,
) -> Result<(), AssignError> {
    match slot {
        Value::Record(record) => record.assign_segments(segments, value, path),
        Value::Map(entries) => {
            let value_ty = ty.map_value().ok_or_else(|| ResolveError::NotAContainer {
                segment: previous.to_owned(),
                found: ty.to_string(),
            })?;
            let (head, rest) = segments.split_first().ok_or(ResolveError::EmptyPath)?;
            if rest.is_empty() {
                let value = value_ty.check(value).map_err(|e| e.within(path))?;
                entries.insert(head.clone(), value);
                return Ok(());
            }
            let entry = entries.get_mut(head).ok_or_else(|| ResolveError::KeyNotFound {
                segment: head.clone(),
                map: previous.to_owned(),
            })?;
            assign_in(entry, value_ty, head, rest, value, path)
        }
        other => Err(ResolveError::NotAContainer {
            segment: previous.to_owned(),
            found: other.type_name().to_owned(),
        }
        .into()),
    }
}

/// Builds a [Record] field by field, checking every value against its
/// declared type and falling back to declared defaults.
#[derive(Debug)]
pub struct RecordBuilder {
    decl: Arc<RecordDecl>,
    given: Vec<(String, Value)>,
}

impl RecordBuilder {
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.given.push((field.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Record, RecordError> {
        let mut values: Vec<Option<Value>> = vec![None; self.decl.fields().len()];
        for (field, value) in self.given {
            let i = self
                .decl
                .position(&field)
                .ok_or_else(|| RecordError::UnknownField {
                    field: field.clone(),
                    record: self.decl.name().to_owned(),
                })?;
            let value = self.decl.fields()[i]
                .ty()
                .check(value)
                .map_err(|e| e.within(&field))?;
            values[i] = Some(value);
        }

        let values = values
            .into_iter()
            .zip(self.decl.fields())
            .map(|(value, field)| match (value, field.default()) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RecordError::MissingField {
                    field: field.name().to_owned(),
                    record: self.decl.name().to_owned(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Record::from_checked(self.decl, values))
    }
}

/// Value found where a declared type was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Field `{path}` expects `{expected}`, got `{actual}`")]
pub struct TypeMismatch {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl TypeMismatch {
    pub fn new(expected: &DataType, actual: &Value) -> Self {
        Self {
            path: String::new(),
            expected: expected.to_string(),
            actual: actual.type_name().to_owned(),
        }
    }

    /// Prefix the path of the mismatch with the location of the checked value.
    pub fn within(mut self, prefix: impl std::fmt::Display) -> Self {
        self.path = format!("{prefix}{}", self.path);
        self
    }
}

/// A field path that does not resolve against a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Field `{segment}` not found in record `{record}`")]
    FieldNotFound { segment: String, record: String },

    #[error("Key `{segment}` not found in map `{map}`")]
    KeyNotFound { segment: String, map: String },

    #[error("Segment `{segment}` is a `{found}`, not a record or a map")]
    NotAContainer { segment: String, found: String },

    #[error("Field path is empty")]
    EmptyPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Record `{record}` has no field `{field}`")]
    UnknownField { field: String, record: String },

    #[error("Record `{record}` is missing required field `{field}`")]
    MissingField { field: String, record: String },

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn nested_decl() -> Arc<RecordDecl> {
        let mut builder = RecordDecl::builder("NestedClass");
        builder.add_field("value", DataType::Integer);
        builder.build().unwrap()
    }

    pub(crate) fn test_decl() -> Arc<RecordDecl> {
        let nested = nested_decl();
        let mut builder = RecordDecl::builder("TestClass");
        builder
            .add_field("field1", DataType::Integer)
            .add_field("field2", DataType::String)
            .add_field("nested", DataType::record(&nested))
            .add_field("list_field", DataType::list(DataType::Integer))
            .add_field_with_default(
                "tags",
                DataType::map(DataType::Float),
                Value::Map(BTreeMap::new()),
            );
        builder.build().unwrap()
    }

    /// `{field1: 1, field2: "test", nested: {value: 10}, list_field: [1, 2, 3]}`
    pub(crate) fn test_record() -> Record {
        let decl = test_decl();
        let nested = decl.field("nested").unwrap().ty().clone();
        let DataType::Record(nested) = nested else {
            panic!("expected DataType::Record, got {nested:?}");
        };
        Record::builder(&decl)
            .set("field1", 1)
            .set("field2", "test")
            .set("nested", Record::builder(&nested).set("value", 10).build().unwrap())
            .set("list_field", vec![1, 2, 3])
            .build()
            .unwrap()
    }

    fn p(path: &str) -> FieldPath {
        FieldPath::parse(path).unwrap()
    }

    #[test]
    fn test_builder_fills_defaults() {
        let record = test_record();
        assert_eq!(record.get("tags"), Some(&Value::Map(BTreeMap::new())));
        assert_eq!(record.get("field1"), Some(&Value::Integer(1)));
        assert_eq!(record.iter().count(), 5);
    }

    #[test]
    fn test_builder_errors() {
        let decl = test_decl();
        let missing = Record::builder(&decl).set("field1", 1).build();
        assert!(matches!(missing, Err(RecordError::MissingField { .. })));

        let unknown = Record::builder(&decl).set("field9", 1).build();
        assert!(matches!(unknown, Err(RecordError::UnknownField { .. })));

        let mismatch = Record::builder(&decl).set("field1", "one").build();
        let Err(RecordError::TypeMismatch(mismatch)) = mismatch else {
            panic!("expected type mismatch, got {mismatch:?}");
        };
        assert_eq!(mismatch.path, "field1");
        assert_eq!(mismatch.actual, "string");
    }

    #[test]
    fn test_resolve_nested() {
        let record = test_record();
        assert_eq!(record.resolve(&p("nested.value")), Ok(&Value::Integer(10)));
        assert_eq!(record.declared_type(&p("nested.value")), Ok(&DataType::Integer));
        assert_eq!(
            record.declared_type(&p("tags.lr")),
            Ok(&DataType::Float),
            "absent map key resolves to the map value type"
        );
    }

    #[test]
    fn test_resolve_errors() {
        let record = test_record();
        assert_eq!(
            record.resolve(&p("nested.missing")),
            Err(ResolveError::FieldNotFound {
                segment: "missing".to_owned(),
                record: "NestedClass".to_owned(),
            })
        );
        assert_eq!(
            record.declared_type(&p("field1.value")),
            Err(ResolveError::NotAContainer {
                segment: "field1".to_owned(),
                found: "integer".to_owned(),
            })
        );
        assert!(matches!(
            record.resolve(&p("tags.lr")),
            Err(ResolveError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_assign_checks_type() {
        let mut record = test_record();
        record.assign(&p("nested.value"), Value::from(30)).unwrap();
        assert_eq!(record.resolve(&p("nested.value")), Ok(&Value::Integer(30)));

        let err = record
            .assign(&p("list_field"), Value::from(vec![Value::from(4), Value::from("5")]))
            .unwrap_err();
        let AssignError::TypeMismatch(mismatch) = err else {
            panic!("expected type mismatch, got {err:?}");
        };
        assert_eq!(mismatch.path, "list_field[1]");
        assert_eq!(mismatch.expected, "integer");
        assert_eq!(record.resolve(&p("list_field")), Ok(&Value::from(vec![1, 2, 3])));
    }

    #[test]
    fn test_assign_map_inserts_and_widens() {
        let mut record = test_record();
        record.assign(&p("tags.lr"), Value::from(1)).unwrap();
        assert_eq!(record.resolve(&p("tags.lr")), Ok(&Value::Float(1.0)));
    }

    #[test]
    fn test_clone_is_independent() {
        let base = test_record();
        let mut copy = base.clone();
        copy.assign(&p("nested.value"), Value::from(99)).unwrap();
        assert_eq!(base.resolve(&p("nested.value")), Ok(&Value::Integer(10)));
        assert_ne!(base, copy);
    }
}
