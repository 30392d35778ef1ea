use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::domain::RecordDecl;
use crate::json::{EncodeError, ReconstructError};
use crate::store::{self, LoadError, SaveError, SaveOptions};
use crate::value::Record;
use crate::variation::{self, Transformations, VariationError, Variations};

/// A statically typed configuration that describes itself as a record.
///
/// The serde representation of the type must have the shape of its
/// declaration: an object with one key per declared field. Union fields are
/// usually enums with `#[serde(untagged)]` over structs carrying a `type`
/// field, or `#[serde(tag = "type")]`.
///
/// The declaration is typically built once and kept in a `OnceLock`.
pub trait Describe: Serialize + DeserializeOwned {
    fn declaration() -> Arc<RecordDecl>;

    /// Convert into a record, checking every field against the declaration.
    fn to_record(&self) -> Result<Record, DescribeError> {
        let json = serde_json::to_value(self).map_err(DescribeError::Serde)?;
        Ok(Record::from_json(&Self::declaration(), &json)?)
    }

    /// Convert back from a record of the declaration.
    fn from_record(record: &Record) -> Result<Self, DescribeError> {
        let json = record.to_json(false)?;
        serde_json::from_value(json).map_err(DescribeError::Serde)
    }
}

/// [variation::generate_variations] over a typed base.
pub fn generate_described<T: Describe>(
    base: &T,
    variations: &Variations,
    transformations: Option<&Transformations>,
) -> Result<Vec<T>, DescribeError> {
    let base = base.to_record()?;
    variation::generate_variations(&base, variations, transformations)?
        .iter()
        .map(T::from_record)
        .collect()
}

/// [store::save] for typed instances. An instance that does not convert
/// into a record of its declaration is reported as an unrecognized shape.
pub fn save_described<T: Describe>(
    instances: &[T],
    dir: &Path,
    options: &SaveOptions,
) -> Result<usize, SaveError> {
    let records = instances
        .iter()
        .enumerate()
        .map(|(i, instance)| {
            instance.to_record().map_err(|e| {
                log::debug!("Instance {} does not describe itself: {e}", i + 1);
                SaveError::ShapeUnrecognized { index: i + 1 }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    store::save(&records, dir, options)
}

pub fn load_one_described<T: Describe>(path: &Path) -> Result<T, DescribeError> {
    let record = store::load_one(path, &T::declaration())?;
    T::from_record(&record)
}

/// Load a directory of typed instances, failing on the first file that does
/// not load.
pub fn load_all_described<T: Describe>(dir: &Path) -> Result<Vec<T>, DescribeError> {
    store::load_all(dir, &T::declaration())?
        .into_strict()?
        .iter()
        .map(T::from_record)
        .collect()
}

#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("Serde conversion failed: {0}")]
    Serde(serde_json::Error),

    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Variation(#[from] VariationError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
