use smallvec::SmallVec;
use thiserror::Error;

/// Dot-delimited address of a possibly nested field, e.g. `training.optimizer`.
///
/// Segments name record fields or map keys, depending on what the path
/// walks through at resolution time. A path always has at least one segment
/// and no segment is empty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: SmallVec<[String; 4]>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, InvalidFieldPath> {
        if path.is_empty() {
            return Err(InvalidFieldPath::Empty);
        }

        let segments = path
            .split('.')
            .map(|segment| {
                if segment.is_empty() {
                    Err(InvalidFieldPath::EmptySegment(path.to_owned()))
                } else {
                    Ok(segment.to_owned())
                }
            })
            .collect::<Result<SmallVec<_>, _>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, the one naming the field that gets assigned.
    pub fn terminal(&self) -> &str {
        // Non-empty by construction.
        &self.segments[self.segments.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl std::str::FromStr for FieldPath {
    type Err = InvalidFieldPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = InvalidFieldPath;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        FieldPath::parse(value)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl std::fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldPath({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFieldPath {
    #[error("Field path is empty")]
    Empty,

    #[error("Field path `{0}` has an empty segment")]
    EmptySegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let path = FieldPath::parse("field1").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.terminal(), "field1");
    }

    #[test]
    fn test_parse_nested() {
        let path: FieldPath = "training.optimizer.lr".parse().unwrap();
        assert_eq!(path.segments(), ["training", "optimizer", "lr"]);
        assert_eq!(path.terminal(), "lr");
        assert_eq!(path.to_string(), "training.optimizer.lr");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(FieldPath::parse(""), Err(InvalidFieldPath::Empty));
        assert!(matches!(
            FieldPath::parse("nested..value"),
            Err(InvalidFieldPath::EmptySegment(_))
        ));
        assert!(FieldPath::parse("nested.").is_err());
        assert!(FieldPath::parse(".nested").is_err());
    }
}
