use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::domain::RecordDecl;
use crate::json::{EncodeError, ReconstructError};
use crate::value::{Record, Value};

/// How [save] writes records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveOptions {
    /// Leave out fields equal to their declared default. Loading puts the
    /// defaults back.
    pub exclude_defaults: bool,

    /// Spaces per indentation level. Zero writes compact JSON.
    pub indent: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            exclude_defaults: false,
            indent: 4,
        }
    }
}

/// Something that may be saved as a record.
pub trait AsRecord {
    /// The record to save, or `None` when the shape is not a record.
    fn as_record(&self) -> Option<&Record>;
}

impl AsRecord for Record {
    fn as_record(&self) -> Option<&Record> {
        Some(self)
    }
}

impl AsRecord for Value {
    fn as_record(&self) -> Option<&Record> {
        Value::as_record(self)
    }
}

impl<T: AsRecord> AsRecord for &T {
    fn as_record(&self) -> Option<&Record> {
        (**self).as_record()
    }
}

/// File name of the `index`-th saved record, counting from 1.
pub fn instance_file_name(index: usize) -> String {
    format!("instance_{index}.json")
}

/// Write every instance to `instance_<n>.json` in `dir`, creating the
/// directory if needed. Returns the number of files written.
///
/// All instances are encoded before the first file is written, so an
/// instance that cannot be saved leaves the directory untouched.
pub fn save<R: AsRecord>(
    instances: &[R],
    dir: &Path,
    options: &SaveOptions,
) -> Result<usize, SaveError> {
    let encoded = instances
        .iter()
        .enumerate()
        .map(|(i, instance)| {
            let index = i + 1;
            let record = instance
                .as_record()
                .ok_or(SaveError::ShapeUnrecognized { index })?;
            let json = record
                .to_json(options.exclude_defaults)
                .map_err(|source| SaveError::Encode { index, source })?;
            to_text(&json, options.indent).map_err(|source| SaveError::Serialize { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    fs::create_dir_all(dir).map_err(|source| SaveError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for (i, text) in encoded.iter().enumerate() {
        let path = dir.join(instance_file_name(i + 1));
        trace!("Writing `{}`", path.display());
        fs::write(&path, text).map_err(|source| SaveError::Io { path, source })?;
    }

    info!("Saved {} files to `{}`", encoded.len(), dir.display());
    Ok(encoded.len())
}

fn to_text(json: &Json, indent: usize) -> serde_json::Result<Vec<u8>> {
    if indent == 0 {
        return serde_json::to_vec(json);
    }

    let indent = vec![b' '; indent];
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)?;
    Ok(out)
}

/// Read one saved record and reconstruct it as an instance of `decl`.
pub fn load_one(path: &Path, decl: &Arc<RecordDecl>) -> Result<Record, LoadError> {
    trace!("Loading `{}` as `{}`", path.display(), decl.name());
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json: Json = serde_json::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Record::from_json(decl, &json).map_err(|source| LoadError::Reconstruct {
        path: path.to_path_buf(),
        record: decl.name().to_owned(),
        source,
    })
}

/// Records loaded from a directory, plus the files that failed.
#[derive(Debug, Default)]
pub struct LoadedDir {
    /// Records in directory listing order.
    pub records: Vec<Record>,
    pub failures: Vec<LoadError>,
}

impl LoadedDir {
    /// All records, or the first failure if any file did not load.
    pub fn into_strict(self) -> Result<Vec<Record>, LoadError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(self.records),
        }
    }
}

/// Load every `.json` file of the directory as an instance of `decl`.
///
/// Every file is loaded on its own: a file that fails is logged, recorded in
/// [LoadedDir::failures], and the scan goes on. Only a directory that cannot
/// be listed fails the call. Records come in directory listing order, which
/// is not the numeric order of the file names.
pub fn load_all(dir: &Path, decl: &Arc<RecordDecl>) -> Result<LoadedDir, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::PathNotDirectory(dir.to_path_buf()));
    }

    let io = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut loaded = LoadedDir::default();
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if !path.is_file() || path.extension() != Some(OsStr::new("json")) {
            trace!("Skipping `{}`, not a JSON file", path.display());
            continue;
        }

        match load_one(&path, decl) {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                warn!("Skipping `{}`: {e}", path.display());
                loaded.failures.push(e);
            }
        }
    }

    debug!(
        "Loaded {} records from `{}`, {} failed",
        loaded.records.len(),
        dir.display(),
        loaded.failures.len()
    );
    Ok(loaded)
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error occurred while saving to `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Instance {index} is not a record")]
    ShapeUnrecognized { index: usize },

    #[error("Instance {index} cannot be encoded: {source}")]
    Encode { index: usize, source: EncodeError },

    #[error("Instance {index} cannot be serialized: {source}")]
    Serialize {
        index: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The provided path is not a directory: `{}`", .0.display())]
    PathNotDirectory(PathBuf),

    #[error("IO error occurred while loading `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed JSON in `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("`{}` is not a valid `{record}`: {source}", .path.display())]
    Reconstruct {
        path: PathBuf,
        record: String,
        source: ReconstructError,
    },
}
