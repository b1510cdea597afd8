//! Fixture sanitizer: rule-based pseudonymization plus a PII
//! lint pass. Pseudonymization is a pure function of `(seed, value)` so
//! output is deterministic and stable across runs with the same seed.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::value::{OrderedMap2, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    Drop,
    Nullify,
    Hash,
    Tokenize,
    Fake(FakeKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FakeKind {
    Email,
    Phone,
    Name,
    Generic,
}

/// Matches a field by dotted path relative to the document root, e.g.
/// `user.email`. A bare field name matches at any depth.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SanitizeRule {
    pub field: String,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SanitizePolicy {
    pub rules: Vec<SanitizeRule>,
    /// Fields dropped after rule application regardless of whether a rule
    /// named them: timestamps, lastModified, server-assigned version
    /// tokens, and the like.
    #[serde(default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,
}

fn default_volatile_fields() -> Vec<String> {
    vec![
        "updatedAt".to_string(),
        "lastModified".to_string(),
        "_version".to_string(),
        "serverTimestamp".to_string(),
    ]
}

fn deterministic_hash(seed: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"::");
    hasher.update(value.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn deterministic_token(seed: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"::");
    hasher.update(value.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("tok_{}", &digest[..16])
}

fn deterministic_fake(seed: &str, value: &str, kind: FakeKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"::fake::");
    hasher.update(value.as_bytes());
    let digest = hex::encode(hasher.finalize());
    let slice = &digest[..8];
    match kind {
        FakeKind::Email => format!("user_{slice}@example.test"),
        FakeKind::Phone => format!("555-{}", &slice[..7.min(slice.len())]),
        FakeKind::Name => format!("Person {slice}"),
        FakeKind::Generic => format!("redacted_{slice}"),
    }
}

fn apply_action(seed: &str, value: &Value, action: RuleAction) -> Option<Value> {
    match action {
        RuleAction::Drop => None,
        RuleAction::Nullify => Some(Value::Null),
        RuleAction::Hash => {
            let raw = value.as_str().map(str::to_string).unwrap_or_else(|| format!("{value:?}"));
            Some(Value::String(deterministic_hash(seed, &raw)))
        }
        RuleAction::Tokenize => {
            let raw = value.as_str().map(str::to_string).unwrap_or_else(|| format!("{value:?}"));
            Some(Value::String(deterministic_token(seed, &raw)))
        }
        RuleAction::Fake(kind) => {
            let raw = value.as_str().map(str::to_string).unwrap_or_else(|| format!("{value:?}"));
            Some(Value::String(deterministic_fake(seed, &raw, kind)))
        }
    }
}

fn rule_for<'a>(policy: &'a SanitizePolicy, path: &[String]) -> Option<&'a SanitizeRule> {
    let dotted = path.join(".");
    let last = path.last().map(String::as_str).unwrap_or("");
    policy
        .rules
        .iter()
        .find(|r| r.field == dotted || r.field == last)
}

fn sanitize_value(policy: &SanitizePolicy, seed: &str, path: &mut Vec<String>, value: &Value) -> Option<Value> {
    if let Some(rule) = rule_for(policy, path) {
        return apply_action(seed, value, rule.action);
    }
    match value {
        Value::Object(map) => {
            let mut out = OrderedMap2::new();
            for (key, child) in map.iter() {
                if policy.volatile_fields.iter().any(|f| f == key) {
                    continue;
                }
                path.push(key.clone());
                if let Some(sanitized) = sanitize_value(policy, seed, path, child) {
                    out.insert(key.clone(), sanitized);
                }
                path.pop();
            }
            Some(Value::Object(out))
        }
        Value::Array(items) => Some(Value::Array(
            items.iter().map(|v| sanitize_value(policy, seed, path, v).unwrap_or(Value::Null)).collect(),
        )),
        other => Some(other.clone()),
    }
}

/// Sanitize one document: apply rules depth-first, drop volatile fields,
/// then re-canonicalize.
pub fn sanitize_document(policy: &SanitizePolicy, seed: &str, doc: &Value) -> Value {
    let mut path = Vec::new();
    let sanitized = sanitize_value(policy, seed, &mut path, doc).unwrap_or(Value::Null);
    canonicalize(&sanitized)
}

/// Sanitize a whole namespace's documents, then sort the canonical JSON
/// strings for a stable line-level diff.
pub fn sanitize_namespace(policy: &SanitizePolicy, seed: &str, docs: &[Value]) -> Vec<String> {
    let mut lines: Vec<String> = docs
        .iter()
        .map(|d| {
            let sanitized = sanitize_document(policy, seed, d);
            serde_json::to_string(&sanitized.into_json()).expect("canonical JSON serializes")
        })
        .collect();
    lines.sort();
    lines
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiViolation {
    pub file: String,
    pub line: usize,
    pub kind: &'static str,
    pub sample: String,
}

impl std::fmt::Display for PiiViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} type={} sample={}", self.file, self.line, self.kind, self.sample)
    }
}

struct PiiPattern {
    kind: &'static str,
    regex: Regex,
}

fn pii_patterns() -> Vec<PiiPattern> {
    vec![
        PiiPattern {
            kind: "email",
            regex: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        },
        PiiPattern {
            kind: "phone",
            regex: Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap(),
        },
        PiiPattern {
            kind: "ssn",
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        },
    ]
}

/// Scan canonical JSON lines for email/phone/SSN-like patterns. Each hit
/// is a violation; callers decide whether to fail based on `--fail-on-pii`.
pub fn lint_lines(file: &str, lines: &[String]) -> Vec<PiiViolation> {
    let patterns = pii_patterns();
    let mut violations = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        for pattern in &patterns {
            if let Some(m) = pattern.regex.find(line) {
                violations.push(PiiViolation {
                    file: file.to_string(),
                    line: index + 1,
                    kind: pattern.kind,
                    sample: m.as_str().to_string(),
                });
            }
        }
    }
    violations
}

/// Distinct kinds a violation set touches, useful for summary reporting.
pub fn violation_kinds(violations: &[PiiViolation]) -> BTreeSet<&'static str> {
    violations.iter().map(|v| v.kind).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_in_seed_and_input() {
        let a = deterministic_hash("seed1", "alice@example.com");
        let b = deterministic_hash("seed1", "alice@example.com");
        let c = deterministic_hash("seed2", "alice@example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn tokenize_is_deterministic_and_short() {
        let t = deterministic_token("seed", "value");
        assert!(t.starts_with("tok_"));
        assert_eq!(t.len(), "tok_".len() + 16);
    }

    #[test]
    fn sanitize_document_applies_hash_rule_and_drops_volatile() {
        let policy = SanitizePolicy {
            rules: vec![SanitizeRule {
                field: "email".to_string(),
                action: RuleAction::Hash,
            }],
            volatile_fields: vec!["updatedAt".to_string()],
        };
        let doc = Value::object([
            ("email".to_string(), Value::String("a@b.com".to_string())),
            ("updatedAt".to_string(), Value::Int64(123)),
            ("name".to_string(), Value::String("Alice".to_string())),
        ]);
        let sanitized = sanitize_document(&policy, "seed", &doc);
        let obj = sanitized.as_object().unwrap();
        assert!(obj.get("email").unwrap().as_str().unwrap().starts_with("sha256:"));
        assert!(!obj.contains_key("updatedAt"));
        assert_eq!(obj.get("name"), Some(&Value::String("Alice".to_string())));
    }

    #[test]
    fn lint_detects_email_and_is_clean_after_sanitization() {
        let raw_line = r#"{"email":"alice@example.com"}"#.to_string();
        let violations = lint_lines("fixture.json", &[raw_line]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, "email");

        let policy = SanitizePolicy {
            rules: vec![SanitizeRule {
                field: "email".to_string(),
                action: RuleAction::Hash,
            }],
            volatile_fields: vec![],
        };
        let doc = Value::object([("email".to_string(), Value::String("alice@example.com".to_string()))]);
        let lines = sanitize_namespace(&policy, "seed", &[doc]);
        let violations_after = lint_lines("fixture.json", &lines);
        assert!(violations_after.is_empty());
    }
}
