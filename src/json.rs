//! Conversion between records and JSON trees.
//!
//! Encoding mirrors the declaration: a record becomes an object with one key
//! per field, lists become arrays, maps become objects, and a union field is
//! written as the object of the member it holds.
//!
//! Decoding is directed by the declared type and never guesses a type from
//! the data alone. Union fields carry no wrapper, so the member is chosen
//! by the following ranked procedure:
//!
//! 1. When the object has a string `type` key and every member declares a
//!    `type` discriminator with pairwise distinct values, the member whose
//!    discriminator equals the tag is used. A tag that no member declares is
//!    an error.
//! 2. Otherwise members are tried in declaration order and the first one
//!    that the object satisfies completely wins: every required field
//!    present, every present field compatible, no unknown keys.
//! 3. No member matching is an error naming every candidate.
//!
//! Outside of step 2, keys that the declaration does not name are ignored.

use std::sync::Arc;

use log::trace;
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

use crate::domain::{DataType, RecordDecl, DISCRIMINATOR};
use crate::value::{Record, Value};

impl Record {
    /// Encode the record as a JSON object.
    ///
    /// With `exclude_defaults`, fields equal to their declared default are
    /// left out at every nesting level. Literal fields and the discriminator
    /// are always written so that union members stay discriminated.
    pub fn to_json(&self, exclude_defaults: bool) -> Result<Json, EncodeError> {
        let has_tag = self.decl().discriminator().is_some();
        let mut object = Map::with_capacity(self.decl().fields().len());
        for (field, (name, value)) in self.decl().fields().iter().zip(self.iter()) {
            let always = matches!(field.ty(), DataType::Literal(_))
                || (has_tag && name == DISCRIMINATOR);
            if exclude_defaults && !always && field.default() == Some(value) {
                continue;
            }
            let json = encode(value, exclude_defaults)
                .map_err(|e| e.within(format_args!(".{name}")))?;
            object.insert(name.to_owned(), json);
        }
        Ok(Json::Object(object))
    }

    /// Reconstruct a record of the declaration from a JSON tree.
    ///
    /// Fields absent from the object take their declared default. Keys that
    /// name no field are ignored.
    pub fn from_json(decl: &Arc<RecordDecl>, json: &Json) -> Result<Record, ReconstructError> {
        match json {
            Json::Object(entries) => reconstruct_fields(decl, entries, false),
            other => Err(ReconstructError::TypeMismatch {
                path: String::new(),
                expected: decl.name().to_owned(),
                actual: json_type_name(other),
            }),
        }
    }
}

/// Encode one value as JSON.
pub fn encode(value: &Value, exclude_defaults: bool) -> Result<Json, EncodeError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or(EncodeError::NonFiniteFloat {
                path: String::new(),
                value: *f,
            })?,
        Value::String(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    encode(item, exclude_defaults).map_err(|e| e.within(format_args!("[{i}]")))
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(key, item)| match encode(item, exclude_defaults) {
                    Ok(json) => Ok((key.clone(), json)),
                    Err(e) => Err(e.within(format_args!(".{key}"))),
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Record(record) => record.to_json(exclude_defaults)?,
    })
}

/// Reconstruct a value of the declared type from a JSON tree.
pub fn reconstruct(ty: &DataType, json: &Json) -> Result<Value, ReconstructError> {
    let mismatch = || ReconstructError::TypeMismatch {
        path: String::new(),
        expected: ty.to_string(),
        actual: json_type_name(json),
    };

    match (ty, json) {
        (DataType::Optional(_), Json::Null) => Ok(Value::Null),
        (DataType::Optional(inner), json) => reconstruct(inner, json),
        (DataType::Integer, Json::Number(n)) => n.as_i64().map(Value::Integer).ok_or_else(mismatch),
        (DataType::Float, Json::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(mismatch),
        (DataType::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (DataType::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (DataType::Literal(lit), Json::String(s)) if s == lit => Ok(Value::String(s.clone())),
        (DataType::List(elem), Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                reconstruct(elem, item).map_err(|e| e.within(format_args!("[{i}]")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (DataType::Map(elem), Json::Object(entries)) => entries
            .iter()
            .map(|(key, item)| match reconstruct(elem, item) {
                Ok(value) => Ok((key.clone(), value)),
                Err(e) => Err(e.within(format_args!(".{key}"))),
            })
            .collect::<Result<_, _>>()
            .map(Value::Map),
        (DataType::Record(decl), Json::Object(entries)) => {
            reconstruct_fields(decl, entries, false).map(Value::Record)
        }
        (DataType::Union(members), Json::Object(entries)) => {
            reconstruct_union(members, entries).map(Value::Record)
        }
        _ => Err(mismatch()),
    }
}

/// With `strict`, a key that names no field of `decl` is an error.
fn reconstruct_fields(
    decl: &Arc<RecordDecl>,
    entries: &Map<String, Json>,
    strict: bool,
) -> Result<Record, ReconstructError> {
    let values = decl
        .fields()
        .iter()
        .map(|field| match entries.get(field.name()) {
            Some(json) => reconstruct(field.ty(), json)
                .map_err(|e| e.within(format_args!(".{}", field.name()))),
            None => field
                .default()
                .cloned()
                .ok_or_else(|| ReconstructError::MissingField {
                    path: String::new(),
                    field: field.name().to_owned(),
                    record: decl.name().to_owned(),
                }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if strict {
        if let Some(key) = entries.keys().find(|key| decl.field(key).is_none()) {
            return Err(ReconstructError::UnknownField {
                path: String::new(),
                field: key.clone(),
                record: decl.name().to_owned(),
            });
        }
    }

    Ok(Record::from_checked(Arc::clone(decl), values))
}

fn reconstruct_union(
    members: &[Arc<RecordDecl>],
    entries: &Map<String, Json>,
) -> Result<Record, ReconstructError> {
    if let (Some(Json::String(tag)), Some(tags)) =
        (entries.get(DISCRIMINATOR), distinct_discriminators(members))
    {
        trace!("Resolving union by discriminator `{tag}`");
        return match members.iter().zip(tags).find(|(_, t)| *t == tag) {
            Some((member, _)) => reconstruct_fields(member, entries, false),
            None => Err(ReconstructError::UnknownDiscriminator {
                path: String::new(),
                tag: tag.clone(),
                candidates: candidate_names(members),
            }),
        };
    }

    for member in members {
        match reconstruct_fields(member, entries, true) {
            Ok(record) => return Ok(record),
            Err(e) => trace!("Union member `{}` rejected: {e}", member.name()),
        }
    }

    Err(ReconstructError::UnionMatch {
        path: String::new(),
        candidates: candidate_names(members),
    })
}

/// Discriminator of every member, when all have one and no two are equal.
fn distinct_discriminators(members: &[Arc<RecordDecl>]) -> Option<Vec<&str>> {
    let tags = members
        .iter()
        .map(|member| member.discriminator())
        .collect::<Option<Vec<_>>>()?;
    let distinct = tags
        .iter()
        .enumerate()
        .all(|(i, tag)| !tags[i + 1..].contains(tag));
    distinct.then_some(tags)
}

fn candidate_names(members: &[Arc<RecordDecl>]) -> Vec<String> {
    members.iter().map(|m| m.name().to_owned()).collect()
}

fn json_type_name(json: &Json) -> String {
    match json {
        Json::Null => "null".to_owned(),
        Json::Bool(_) => "boolean".to_owned(),
        Json::Number(n) if n.is_f64() => "float".to_owned(),
        Json::Number(n) if n.is_i64() => "integer".to_owned(),
        Json::Number(_) => "unsigned integer out of range".to_owned(),
        Json::String(s) => format!("string {s:?}"),
        Json::Array(_) => "array".to_owned(),
        Json::Object(_) => "object".to_owned(),
    }
}

/// JSON that does not reconstruct into the declared type.
///
/// Paths are written from the root of the document, `$`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error("Expected `{expected}` at `${path}`, found {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Missing required field `{field}` of `{record}` at `${path}`")]
    MissingField {
        path: String,
        field: String,
        record: String,
    },

    #[error("Unknown field `{field}` for `{record}` at `${path}`")]
    UnknownField {
        path: String,
        field: String,
        record: String,
    },

    #[error(
        "No union member matches the data at `${path}`, tried: {}",
        .candidates.join(", ")
    )]
    UnionMatch {
        path: String,
        candidates: Vec<String>,
    },

    #[error(
        "Discriminator `{tag}` at `${path}` matches no union member, tried: {}",
        .candidates.join(", ")
    )]
    UnknownDiscriminator {
        path: String,
        tag: String,
        candidates: Vec<String>,
    },
}

impl ReconstructError {
    pub fn path(&self) -> &str {
        match self {
            ReconstructError::TypeMismatch { path, .. }
            | ReconstructError::MissingField { path, .. }
            | ReconstructError::UnknownField { path, .. }
            | ReconstructError::UnionMatch { path, .. }
            | ReconstructError::UnknownDiscriminator { path, .. } => path,
        }
    }

    /// Prefix the path with the location the failing node was reached through.
    pub fn within(mut self, prefix: impl std::fmt::Display) -> Self {
        match &mut self {
            ReconstructError::TypeMismatch { path, .. }
            | ReconstructError::MissingField { path, .. }
            | ReconstructError::UnknownField { path, .. }
            | ReconstructError::UnionMatch { path, .. }
            | ReconstructError::UnknownDiscriminator { path, .. } => {
                *path = format!("{prefix}{path}");
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("Float `{value}` at `${path}` cannot be represented in JSON")]
    NonFiniteFloat { path: String, value: f64 },
}

impl EncodeError {
    pub fn within(self, prefix: impl std::fmt::Display) -> Self {
        match self {
            EncodeError::NonFiniteFloat { path, value } => EncodeError::NonFiniteFloat {
                path: format!("{prefix}{path}"),
                value,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::value::tests::{test_decl, test_record};

    pub(crate) fn config_a() -> Arc<RecordDecl> {
        let mut builder = RecordDecl::builder("ConfigA");
        builder
            .add_field("type", DataType::literal("A"))
            .add_field("value_a", DataType::Integer);
        builder.build().unwrap()
    }

    pub(crate) fn config_b() -> Arc<RecordDecl> {
        let mut builder = RecordDecl::builder("ConfigB");
        builder
            .add_field("type", DataType::literal("B"))
            .add_field("value_b", DataType::String);
        builder.build().unwrap()
    }

    /// `Experiment { name: str, config: ConfigA | ConfigB, seeds: list<int> = [0] }`
    pub(crate) fn experiment_decl() -> Arc<RecordDecl> {
        let mut builder = RecordDecl::builder("Experiment");
        builder
            .add_field("name", DataType::String)
            .add_field("config", DataType::union([&config_a(), &config_b()]))
            .add_field_with_default("seeds", DataType::list(DataType::Integer), vec![0]);
        builder.build().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let record = test_record();
        let json = record.to_json(false).unwrap();
        assert_eq!(
            json,
            json!({
                "field1": 1,
                "field2": "test",
                "nested": {"value": 10},
                "list_field": [1, 2, 3],
                "tags": {},
            })
        );
        assert_eq!(Record::from_json(&test_decl(), &json).unwrap(), record);
    }

    #[test]
    fn test_exclude_defaults_round_trip() {
        let record = test_record();
        let json = record.to_json(true).unwrap();
        assert!(json.get("tags").is_none());
        assert_eq!(Record::from_json(&test_decl(), &json).unwrap(), record);
    }

    #[test]
    fn test_union_by_discriminator() {
        let json = json!({"name": "run", "config": {"type": "B", "value_b": "Hello"}});
        let record = Record::from_json(&experiment_decl(), &json).unwrap();
        let config = record.get("config").unwrap().as_record().unwrap();
        assert_eq!(config.decl().name(), "ConfigB");
        assert_eq!(config.get("value_b"), Some(&Value::from("Hello")));
        assert_eq!(record.get("seeds"), Some(&Value::from(vec![0])));
    }

    #[test]
    fn test_union_literal_kept_with_exclude_defaults() {
        let json = json!({"name": "run", "config": {"type": "B", "value_b": "Hello"}});
        let record = Record::from_json(&experiment_decl(), &json).unwrap();
        let encoded = record.to_json(true).unwrap();
        assert_eq!(encoded, json);
    }

    #[test]
    fn test_union_structural_without_tag() {
        let json = json!({"name": "run", "config": {"value_b": "Hello"}});
        let record = Record::from_json(&experiment_decl(), &json).unwrap();
        let config = record.get("config").unwrap().as_record().unwrap();
        assert_eq!(config.decl().name(), "ConfigB");
        assert_eq!(config.get("type"), Some(&Value::from("B")));
    }

    #[test]
    fn test_union_structural_prefers_complete_member() {
        let mut small = RecordDecl::builder("Small");
        small.add_field("x", DataType::Integer);
        let small = small.build().unwrap();
        let mut large = RecordDecl::builder("Large");
        large
            .add_field("x", DataType::Integer)
            .add_field("y", DataType::Integer);
        let large = large.build().unwrap();

        let ty = DataType::union([&small, &large]);
        let value = reconstruct(&ty, &json!({"x": 1, "y": 2})).unwrap();
        assert_eq!(value.as_record().unwrap().decl().name(), "Large");
        let value = reconstruct(&ty, &json!({"x": 1})).unwrap();
        assert_eq!(value.as_record().unwrap().decl().name(), "Small");
    }

    #[test]
    fn test_union_errors() {
        let decl = experiment_decl();
        let err = Record::from_json(&decl, &json!({"name": "n", "config": {"type": "C"}}))
            .unwrap_err();
        assert_eq!(
            err,
            ReconstructError::UnknownDiscriminator {
                path: ".config".to_owned(),
                tag: "C".to_owned(),
                candidates: vec!["ConfigA".to_owned(), "ConfigB".to_owned()],
            }
        );

        let err = Record::from_json(&decl, &json!({"name": "n", "config": {"other": 1}}))
            .unwrap_err();
        assert!(matches!(err, ReconstructError::UnionMatch { .. }));
        assert_eq!(
            err.to_string(),
            "No union member matches the data at `$.config`, tried: ConfigA, ConfigB"
        );

        let err = Record::from_json(
            &decl,
            &json!({"name": "n", "config": {"type": "A", "value_a": "x"}}),
        )
        .unwrap_err();
        assert_eq!(err.path(), ".config.value_a");
    }

    #[test]
    fn test_field_errors() {
        let decl = test_decl();
        let err = Record::from_json(&decl, &json!({"field1": 1})).unwrap_err();
        assert!(matches!(err, ReconstructError::MissingField { ref field, .. } if field == "field2"));


        let mut json = test_record().to_json(false).unwrap();
        json["list_field"] = json!([1, 2.5]);
        let err = Record::from_json(&decl, &json).unwrap_err();
        assert_eq!(
            err,
            ReconstructError::TypeMismatch {
                path: ".list_field[1]".to_owned(),
                expected: "integer".to_owned(),
                actual: "float".to_owned(),
            }
        );

        let err = Record::from_json(&decl, &json!([1])).unwrap_err();
        assert!(matches!(err, ReconstructError::TypeMismatch { .. }));
    }

    #[test]
    fn test_extra_keys_ignored() {
        let mut json = test_record().to_json(false).unwrap();
        json["extra"] = json!(true);
        json["nested"]["note"] = json!("kept out");
        assert_eq!(Record::from_json(&test_decl(), &json).unwrap(), test_record());

        let json = json!({"name": "run", "config": {"type": "A", "value_a": 1, "note": "x"}});
        let record = Record::from_json(&experiment_decl(), &json).unwrap();
        let config = record.get("config").unwrap().as_record().unwrap();
        assert_eq!(config.decl().name(), "ConfigA");
    }

    #[test]
    fn test_structural_match_rejects_extra_keys() {
        let mut small = RecordDecl::builder("Small");
        small.add_field("x", DataType::Integer);
        let small = small.build().unwrap();

        let err = reconstruct(&DataType::union([&small]), &json!({"x": 1, "z": 2})).unwrap_err();
        assert!(matches!(err, ReconstructError::UnionMatch { .. }));
    }

    #[test]
    fn test_string_discriminator_kept_with_exclude_defaults() {
        let mut builder = RecordDecl::builder("Sgd");
        builder
            .add_field_with_default("type", DataType::String, "sgd")
            .add_field("lr", DataType::Float);
        let sgd = builder.build().unwrap();
        let record = Record::builder(&sgd).set("lr", 0.5).build().unwrap();
        assert_eq!(record.to_json(true).unwrap(), json!({"type": "sgd", "lr": 0.5}));
    }

    #[test]
    fn test_float_accepts_integer() {
        assert_eq!(reconstruct(&DataType::Float, &json!(3)).unwrap(), Value::Float(3.0));
        assert_eq!(
            reconstruct(&DataType::optional(DataType::Float), &json!(null)).unwrap(),
            Value::Null
        );
        assert!(reconstruct(&DataType::Integer, &json!(null)).is_err());
    }

    #[test]
    fn test_non_finite_float() {
        let mut builder = RecordDecl::builder("Lr");
        builder.add_field("lr", DataType::Float);
        let decl = builder.build().unwrap();
        let record = Record::builder(&decl).set("lr", f64::NAN).build().unwrap();
        let err = record.to_json(false).unwrap_err();
        assert!(matches!(err, EncodeError::NonFiniteFloat { ref path, .. } if path == ".lr"));
    }
}
