//! JSONPath-style probe grammar for replay verification.
//!
//! `$` denotes the root replay state object. Segments: `.<key>` for map
//! descent, `[<n>]` for a 0-based array index. Malformed paths (empty
//! key, unterminated bracket, non-integer index) are construction-time
//! errors; a missing key or out-of-range index at read time evaluates to
//! `null`.

use crate::errors::ValidationError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbePath {
    raw: String,
    segments: Vec<Segment>,
}

impl ProbePath {
    /// Parse a probe path string, e.g. `$.commandResults[0].ok`.
    pub fn parse(path: &str) -> Result<ProbePath, ValidationError> {
        let mut chars = path.chars().peekable();
        match chars.next() {
            Some('$') => {}
            _ => return Err(ValidationError(format!("probe path '{path}' must start with '$'"))),
        }

        let mut segments = Vec::new();
        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let mut key = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        key.push(c);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(ValidationError(format!(
                            "probe path '{path}' has an empty key after '.'"
                        )));
                    }
                    segments.push(Segment::Key(key));
                }
                '[' => {
                    chars.next();
                    let mut digits = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(c);
                    }
                    if !closed {
                        return Err(ValidationError(format!(
                            "probe path '{path}' has an unterminated '['"
                        )));
                    }
                    let index: usize = digits.parse().map_err(|_| {
                        ValidationError(format!(
                            "probe path '{path}' has a non-integer index '{digits}'"
                        ))
                    })?;
                    segments.push(Segment::Index(index));
                }
                _ => {
                    return Err(ValidationError(format!(
                        "probe path '{path}' has an unexpected character '{c}'"
                    )));
                }
            }
        }

        Ok(ProbePath {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Evaluate this path against a replay-state root, returning `Null`
    /// for any missing key or out-of-range index along the way.
    pub fn evaluate<'a>(&self, root: &'a Value) -> Value {
        let mut current = root;
        for segment in &self.segments {
            let next = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Value::Null,
            }
        }
        current.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ReplayProbe {
    pub path: ProbePath,
    pub expected_value: Value,
}

impl ReplayProbe {
    pub fn new(path: impl AsRef<str>, expected_value: Value) -> Result<ReplayProbe, ValidationError> {
        Ok(ReplayProbe {
            path: ProbePath::parse(path.as_ref())?,
            expected_value,
        })
    }

    /// Whether the probe holds against `root`, via the diff engine's
    /// semantic equality.
    pub fn matches(&self, root: &Value) -> bool {
        crate::canonical::semantic_eq(&self.path.evaluate(root), &self.expected_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_returns_whole_tree() {
        let path = ProbePath::parse("$").unwrap();
        let root = Value::Int32(1);
        assert_eq!(path.evaluate(&root), Value::Int32(1));
    }

    #[test]
    fn rejects_missing_dollar_prefix() {
        assert!(ProbePath::parse("commandResults[0]").is_err());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(ProbePath::parse("$.").is_err());
    }

    #[test]
    fn rejects_unterminated_bracket() {
        assert!(ProbePath::parse("$.commandResults[0").is_err());
    }

    #[test]
    fn rejects_non_integer_index() {
        assert!(ProbePath::parse("$.commandResults[x]").is_err());
    }

    #[test]
    fn missing_segment_evaluates_to_null() {
        let path = ProbePath::parse("$.commandResults[0].ok").unwrap();
        let root = Value::object([(
            "commandResults".to_string(),
            Value::Array(vec![]),
        )]);
        assert_eq!(path.evaluate(&root), Value::Null);
    }

    #[test]
    fn probe_matches_nested_value() {
        let root = Value::object([(
            "commandResults".to_string(),
            Value::Array(vec![Value::object([(
                "ok".to_string(),
                Value::Double(1.0),
            )])]),
        )]);
        let probe = ReplayProbe::new("$.commandResults[0].ok", Value::Int32(1)).unwrap();
        assert!(probe.matches(&root));
    }
}
