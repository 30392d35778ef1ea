//! Sweep plans: variations and save options written down as YAML.
//!
//! ```yaml
//! variations:
//!   field1: [1, 2, 3]
//!   nested.value: [10, 20]
//! save:
//!   exclude_defaults: true
//! ```
//!
//! Keys of `variations` are field paths, kept in document order. Every
//! candidate is reconstructed against the type declared at its path in the
//! base record, so nested records and union members are written the same way
//! as in saved instance files.

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::json::{self, ReconstructError};
use crate::path::{FieldPath, InvalidFieldPath};
use crate::store::SaveOptions;
use crate::value::{Record, ResolveError};
use crate::variation::Variations;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pub variations: Variations,
    pub save: SaveOptions,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    variations: serde_yml::Mapping,

    #[serde(default)]
    save: SaveOptions,
}

impl SweepPlan {
    /// Parse a plan whose field paths and candidates are checked against `base`.
    pub fn from_yaml(base: &Record, yaml: &str) -> Result<Self, PlanError> {
        let raw: RawPlan = serde_yml::from_str(yaml)?;

        let mut variations = Variations::new();
        for (key, candidates) in &raw.variations {
            let key = key
                .as_str()
                .ok_or_else(|| PlanError::KeyNotString(format!("{key:?}")))?;
            let path = FieldPath::parse(key)?;
            let ty = base.declared_type(&path)?;

            let candidates = candidates
                .as_sequence()
                .ok_or_else(|| PlanError::NotASequence(path.to_string()))?;
            let candidates = candidates
                .iter()
                .enumerate()
                .map(|(i, candidate)| {
                    let json = serde_json::to_value(candidate).map_err(|source| {
                        PlanError::Candidate {
                            path: path.to_string(),
                            index: i,
                            source: CandidateError::Convert(source),
                        }
                    })?;
                    json::reconstruct(ty, &json).map_err(|source| PlanError::Candidate {
                        path: path.to_string(),
                        index: i,
                        source: CandidateError::Reconstruct(source),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            variations.insert(path, candidates);
        }

        debug!(
            "Parsed sweep plan with {} paths and {} combinations",
            variations.len(),
            variations
                .combination_count()
                .map_or_else(|| "too many".to_owned(), |n| n.to_string())
        );
        Ok(Self {
            variations,
            save: raw.save,
        })
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Sweep plan is not valid YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Variation key {0} is not a string")]
    KeyNotString(String),

    #[error(transparent)]
    InvalidPath(#[from] InvalidFieldPath),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Candidates of `{0}` are not a sequence")]
    NotASequence(String),

    #[error("Candidate {index} of `{path}` is invalid: {source}")]
    Candidate {
        path: String,
        index: usize,
        source: CandidateError,
    },
}

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("cannot convert to JSON: {0}")]
    Convert(serde_json::Error),

    #[error(transparent)]
    Reconstruct(ReconstructError),
}
