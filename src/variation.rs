use log::{debug, trace, warn};
use thiserror::Error;

use crate::path::FieldPath;
use crate::value::{AssignError, Record, ResolveError, Value};

/// Candidate values per field path, kept in insertion order.
///
/// The insertion order is the column order of every combination produced by
/// [generate_variations].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variations {
    entries: Vec<(FieldPath, Vec<Value>)>,
}

impl Variations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidates of the path. A path inserted again keeps its
    /// original position and gets the new candidates.
    pub fn insert<V: Into<Value>>(
        &mut self,
        path: FieldPath,
        candidates: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let candidates = candidates.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = candidates,
            None => self.entries.push((path, candidates)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &[Value])> {
        self.entries.iter().map(|(p, c)| (p, c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of combinations, the product of all candidate counts, or
    /// `None` when the product does not fit in `usize`.
    pub fn combination_count(&self) -> Option<usize> {
        self.entries
            .iter()
            .try_fold(1usize, |total, (_, c)| total.checked_mul(c.len()))
    }

    /// Combinations in canonical order: the last path varies fastest.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations::new(self)
    }
}

/// Functions applied to the current value of a field, after substitution.
#[derive(Default)]
pub struct Transformations<'a> {
    entries: Vec<(FieldPath, Box<dyn Fn(&Value) -> Value + 'a>)>,
}

impl<'a> Transformations<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transformation. They run in the order they were inserted.
    pub fn insert(
        &mut self,
        path: FieldPath,
        transform: impl Fn(&Value) -> Value + 'a,
    ) -> &mut Self {
        self.entries.push((path, Box::new(transform)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Transformations<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(path, _)| path))
            .finish()
    }
}

/// Iterator over the Cartesian product of the candidates of [Variations].
///
/// Each item holds one value per path, in the insertion order of the paths.
#[derive(Debug)]
pub struct Combinations<'v> {
    variations: &'v Variations,
    indices: Vec<usize>,
    done: bool,
}

impl<'v> Combinations<'v> {
    fn new(variations: &'v Variations) -> Self {
        Self {
            variations,
            indices: vec![0; variations.len()],
            done: variations.entries.iter().any(|(_, c)| c.is_empty()),
        }
    }
}

impl<'v> Iterator for Combinations<'v> {
    type Item = Vec<&'v Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let entries = &self.variations.entries;
        let item = entries
            .iter()
            .zip(&self.indices)
            .map(|((_, candidates), &i)| &candidates[i])
            .collect();

        // Advance the odometer from the last column.
        self.done = true;
        for (column, (_, candidates)) in entries.iter().enumerate().rev() {
            self.indices[column] += 1;
            if self.indices[column] < candidates.len() {
                self.done = false;
                break;
            }
            self.indices[column] = 0;
        }

        Some(item)
    }
}

/// Produce one record per combination of the candidate values.
///
/// Each output is a deep copy of `base` with every varied path assigned its
/// value from the combination, in path order, then with every transformation
/// applied in order to the current value of its path. Every assignment is
/// type-checked against the declared type of the field.
///
/// Generation is all-or-nothing: the first failure aborts the call. Paths
/// are checked against `base` before any copy is made.
pub fn generate_variations(
    base: &Record,
    variations: &Variations,
    transformations: Option<&Transformations>,
) -> Result<Vec<Record>, VariationError> {
    for (path, _) in variations.iter() {
        base.declared_type(path)?;
    }

    let total = variations.combination_count();
    match total {
        Some(total) => debug!(
            "Generating {total} variations of `{}` over {} paths",
            base.decl().name(),
            variations.len()
        ),
        None => warn!(
            "Variations of `{}` over {} paths exceed {} combinations",
            base.decl().name(),
            variations.len(),
            usize::MAX
        ),
    }

    let mut results = Vec::with_capacity(total.unwrap_or(0));
    for (index, combination) in variations.combinations().enumerate() {
        trace!("Combination {index}: {combination:?}");
        let mut instance = base.clone();

        for ((path, _), value) in variations.iter().zip(combination) {
            instance
                .assign(path, value.clone())
                .map_err(|source| VariationError::Combination { index, source })?;
        }

        if let Some(transformations) = transformations {
            for (path, transform) in &transformations.entries {
                let current = instance
                    .resolve(path)
                    .map_err(|e| VariationError::Combination {
                        index,
                        source: e.into(),
                    })?;
                let transformed = transform(current);
                instance
                    .assign(path, transformed)
                    .map_err(|source| VariationError::Combination { index, source })?;
            }
        }

        results.push(instance);
    }

    Ok(results)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariationError {
    #[error("Variation path does not resolve: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Combination {index} failed: {source}")]
    Combination { index: usize, source: AssignError },
}
