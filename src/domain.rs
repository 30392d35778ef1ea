use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_regex::regex_is_match;
use log::trace;
use thiserror::Error;

use crate::value::{TypeMismatch, Value};

/// Name of the field that carries the literal tag of a union member.
pub const DISCRIMINATOR: &str = "type";

/// Declaration of a record type: its name and the ordered list of its fields.
///
/// Declarations are statically known shapes. They are built once through
/// [RecordDeclBuilder] and then shared behind [Arc] by every instance and by
/// every field that nests them. Nothing in the crate mutates a declaration
/// after it is built.
#[derive(Debug, PartialEq)]
pub struct RecordDecl {
    name: ItemName,
    fields: Vec<FieldDecl>,
}

impl RecordDecl {
    pub fn builder(name: impl Into<String>) -> RecordDeclBuilder {
        RecordDeclBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Position of the field in declaration order, which is also the position
    /// of its value in every [crate::value::Record] of this declaration.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Literal value of the `type` field, if this declaration carries one.
    ///
    /// Both a [DataType::Literal] field and a plain string field with a
    /// string default count as a discriminator.
    pub fn discriminator(&self) -> Option<&str> {
        let field = self.field(DISCRIMINATOR)?;
        match (&field.ty, &field.default) {
            (DataType::Literal(lit), _) => Some(lit),
            (DataType::String, Some(Value::String(tag))) => Some(tag),
            _ => None,
        }
    }
}

/// Whether two handles point to the same declaration.
pub(crate) fn same_decl(a: &Arc<RecordDecl>, b: &Arc<RecordDecl>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

#[derive(Debug, PartialEq)]
pub struct FieldDecl {
    name: ItemName,
    ty: DataType,
    default: Option<Value>,
}

impl FieldDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &DataType {
        &self.ty
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// 64-bit signed integer.
    Integer,

    /// 64-bit float. Integers are accepted and widened.
    Float,

    String,

    Boolean,

    /// A string that may only hold this exact value.
    Literal(String),

    /// Either `null` or a value of the inner type.
    Optional(Box<DataType>),

    /// Sequence where every element has the inner type.
    List(Box<DataType>),

    /// Mapping from string keys to values of the inner type.
    Map(Box<DataType>),

    /// Nested record of exactly this declaration.
    Record(Arc<RecordDecl>),

    /// Nested record of any one of these declarations.
    Union(Vec<Arc<RecordDecl>>),
}

impl DataType {
    pub fn literal(value: impl Into<String>) -> Self {
        DataType::Literal(value.into())
    }

    pub fn optional(inner: DataType) -> Self {
        DataType::Optional(Box::new(inner))
    }

    pub fn list(elem: DataType) -> Self {
        DataType::List(Box::new(elem))
    }

    pub fn map(value: DataType) -> Self {
        DataType::Map(Box::new(value))
    }

    pub fn record(decl: &Arc<RecordDecl>) -> Self {
        DataType::Record(Arc::clone(decl))
    }

    pub fn union<'a>(members: impl IntoIterator<Item = &'a Arc<RecordDecl>>) -> Self {
        DataType::Union(members.into_iter().map(Arc::clone).collect())
    }

    /// Type of the values held by a map type, looking through [DataType::Optional].
    pub fn map_value(&self) -> Option<&DataType> {
        match self {
            DataType::Map(value) => Some(value),
            DataType::Optional(inner) => inner.map_value(),
            _ => None,
        }
    }

    /// Check the value against this type, returning it in canonical form.
    ///
    /// The only conversion performed is widening an integer into a float.
    /// Records are checked by declaration identity: a [crate::value::Record]
    /// can only be built from values that already conform to its declaration.
    /// On mismatch the error path points below the checked value, e.g. `[1]`
    /// for the second element of a list; callers prefix it with their own path.
    pub fn check(&self, value: Value) -> Result<Value, TypeMismatch> {
        match (self, value) {
            (DataType::Integer, v @ Value::Integer(_)) => Ok(v),
            (DataType::Float, v @ Value::Float(_)) => Ok(v),
            (DataType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (DataType::String, v @ Value::String(_)) => Ok(v),
            (DataType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (DataType::Literal(lit), Value::String(s)) if s == *lit => Ok(Value::String(s)),
            (DataType::Optional(_), Value::Null) => Ok(Value::Null),
            (DataType::Optional(inner), v) => inner.check(v),
            (DataType::List(elem), Value::List(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    elem.check(item)
                        .map_err(|e| e.within(format_args!("[{i}]")))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (DataType::Map(elem), Value::Map(entries)) => entries
                .into_iter()
                .map(|(key, item)| match elem.check(item) {
                    Ok(item) => Ok((key, item)),
                    Err(e) => Err(e.within(format_args!(".{key}"))),
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map),
            (DataType::Record(decl), Value::Record(r)) if same_decl(decl, r.decl()) => {
                Ok(Value::Record(r))
            }
            (DataType::Union(members), Value::Record(r))
                if members.iter().any(|m| same_decl(m, r.decl())) =>
            {
                Ok(Value::Record(r))
            }
            (ty, v) => Err(TypeMismatch::new(ty, &v)),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Integer => f.write_str("integer"),
            DataType::Float => f.write_str("float"),
            DataType::String => f.write_str("string"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::Literal(lit) => write!(f, "{lit:?}"),
            DataType::Optional(inner) => write!(f, "optional<{inner}>"),
            DataType::List(elem) => write!(f, "list<{elem}>"),
            DataType::Map(value) => write!(f, "map<string, {value}>"),
            DataType::Record(decl) => f.write_str(decl.name()),
            DataType::Union(members) => {
                let names = members.iter().map(|m| m.name()).collect::<Vec<_>>();
                f.write_str(&names.join(" | "))
            }
        }
    }
}

/// Collects field declarations of one record type.
///
/// Problems are not reported while adding fields; [RecordDeclBuilder::build]
/// validates everything at once and returns the full list of errors.
#[derive(Debug)]
pub struct RecordDeclBuilder {
    name: String,
    fields: Vec<(String, DataType, Option<Value>)>,
}

impl RecordDeclBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Add a required field.
    pub fn add_field(&mut self, name: impl Into<String>, ty: DataType) -> &mut Self {
        self.fields.push((name.into(), ty, None));
        self
    }

    /// Add a field that falls back to `default` when not given.
    pub fn add_field_with_default(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        default: impl Into<Value>,
    ) -> &mut Self {
        self.fields.push((name.into(), ty, Some(default.into())));
        self
    }

    /// Validate all the fields and build the declaration.
    /// This method will return the declaration if all the fields are valid,
    /// or a list of errors if there are any issues with them.
    pub fn build(self) -> Result<Arc<RecordDecl>, Vec<DeclError>> {
        trace!("Building record declaration `{}`", self.name);
        let mut errors = Vec::new();

        let name = ItemName::new(self.name).map_err(DeclError::InvalidName);
        let name = match name {
            Ok(name) => Some(name),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut fields: Vec<FieldDecl> = Vec::with_capacity(self.fields.len());
        let mut duplicated = Vec::new();
        for (field_name, ty, default) in self.fields {
            let field_name = match ItemName::new(field_name) {
                Ok(n) => n,
                Err(e) => {
                    errors.push(DeclError::InvalidName(e));
                    continue;
                }
            };

            if fields.iter().any(|f| f.name == field_name) {
                if !duplicated.contains(&field_name) {
                    duplicated.push(field_name);
                }
                continue;
            }

            let default = match (default, &ty) {
                (Some(default), _) => match ty.check(default) {
                    Ok(default) => Some(default),
                    Err(mismatch) => {
                        errors.push(DeclError::DefaultMismatch {
                            field: field_name,
                            mismatch,
                        });
                        continue;
                    }
                },
                (None, DataType::Literal(lit)) => Some(Value::String(lit.clone())),
                (None, _) => None,
            };

            fields.push(FieldDecl {
                name: field_name,
                ty,
                default,
            });
        }

        if !duplicated.is_empty() {
            errors.push(DeclError::DuplicatedFields(duplicated));
        }

        match name {
            Some(name) if errors.is_empty() => Ok(Arc::new(RecordDecl { name, fields })),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeclError {
    #[error(transparent)]
    InvalidName(InvalidItemName),

    #[error(
        "Duplicated fields found in the declaration: {}",
        .0.iter().map(|name| name.to_string()).collect::<Vec<_>>().join(", ")
    )]
    DuplicatedFields(Vec<ItemName>),

    #[error("Default of field `{field}` does not conform to its type: {mismatch}")]
    DefaultMismatch {
        field: ItemName,
        mismatch: TypeMismatch,
    },
}

#[derive(Debug, Error)]
#[error("Invalid item name: {0}")]
pub struct InvalidItemName(String);

/// Name of a record declaration or of one of its fields.
#[derive(Clone, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ItemName(String);

impl ItemName {
    pub fn new(name: String) -> Result<Self, InvalidItemName> {
        if regex_is_match!(r"^[a-zA-Z_][a-zA-Z0-9_]{0,63}$", &name) {
            Ok(Self(name))
        } else {
            Err(InvalidItemName(name))
        }
    }
}

impl AsRef<str> for ItemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ItemName {
    type Err = InvalidItemName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemName::new(s.to_string())
    }
}

impl std::borrow::Borrow<str> for ItemName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ItemName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: AsRef<str>> std::cmp::PartialEq<T> for ItemName {
    fn eq(&self, other: &T) -> bool {
        self.0 == other.as_ref()
    }
}
