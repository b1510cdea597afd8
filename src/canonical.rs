//! Canonicalization and semantic equality.
//!
//! Canonicalization sorts object keys lexicographically, recursively;
//! arrays keep their order; scalar leaves are preserved as-is. Semantic
//! equality layers numeric coercion on top so `1 == 1.0 == 1.000` without
//! requiring canonicalization to have normalized the representation.

use crate::value::{OrderedMap2, Value};

/// Recursively sort object keys lexicographically. Idempotent:
/// `canonicalize(canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect::<OrderedMap2>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Whether `value` is numeric for the purposes of the numeric
/// equivalence rule below.
fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_)
    )
}

/// Render a numeric `Value` as a canonical decimal string: no leading
/// zeros (beyond a single `0`), no trailing fractional zeros, no
/// exponent. `1`, `1.0`, and `1.000` all render as `"1"`.
fn decimal_string(value: &Value) -> Option<String> {
    let raw = match value {
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Double(d) => {
            if !d.is_finite() {
                return Some(format!("#{d}"));
            }
            format!("{d}")
        }
        Value::Decimal(s) => s.clone(),
        _ => return None,
    };
    Some(trim_decimal(&raw))
}

fn trim_decimal(raw: &str) -> String {
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(r) => ("-", r),
        None => ("", raw),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    let int_trimmed = int_part.trim_start_matches('0');
    let int_trimmed = if int_trimmed.is_empty() {
        "0"
    } else {
        int_trimmed
    };
    let frac_trimmed = frac_part.trim_end_matches('0');

    let magnitude = if frac_trimmed.is_empty() {
        int_trimmed.to_string()
    } else {
        format!("{int_trimmed}.{frac_trimmed}")
    };

    if sign == "-" && magnitude != "0" {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

/// Semantic equality: Null≡Null; numbers compare by
/// arbitrary-precision decimal value regardless of representation;
/// strings/bools/dates/bytes compare by value; objects compare by key
/// set plus recursive child equality; arrays compare pairwise by index.
/// Any other type mismatch (including numeric vs. string "1") is unequal.
pub fn semantic_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::DateTimeMs(x), Value::DateTimeMs(y)) => x == y,
        (Value::ObjectIdHex(x), Value::ObjectIdHex(y)) => x.eq_ignore_ascii_case(y),
        (x, y) if is_numeric(x) && is_numeric(y) => decimal_string(x) == decimal_string(y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(i, j)| semantic_eq(i, j))
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            if xk != yk {
                return false;
            }
            xk.iter().all(|k| {
                let xv = x.get(k).expect("key present");
                let yv = y.get(k).expect("key present");
                semantic_eq(xv, yv)
            })
        }
        _ => false,
    }
}

/// `semanticEqual(a,b) ⇔ diff(a,b) = ∅` is checked against `crate::diff`
/// in integration tests; here we only guarantee this module's half of
/// that property holds in isolation.
#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn numeric_equivalence() {
        assert!(semantic_eq(&Value::Int32(1), &Value::Double(1.0)));
        assert!(semantic_eq(
            &Value::Int32(1),
            &Value::Decimal("1.000".to_string())
        ));
        assert!(semantic_eq(
            &Value::Double(1.0),
            &Value::Decimal("1.000".to_string())
        ));
        assert!(!semantic_eq(&Value::String("1".to_string()), &Value::Int32(1)));
    }

    #[test]
    fn canonicalize_sorts_keys_recursively() {
        let v = obj(&[
            ("b", Value::Int32(2)),
            ("a", obj(&[("z", Value::Int32(1)), ("y", Value::Int32(2))])),
        ]);
        let c = canonicalize(&v);
        let top = c.as_object().unwrap();
        let keys: Vec<&String> = top.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        let nested = top.get("a").unwrap().as_object().unwrap();
        let nested_keys: Vec<&String> = nested.keys().collect();
        assert_eq!(nested_keys, vec!["y", "z"]);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let v = obj(&[("b", Value::Int32(1)), ("a", Value::Int32(2))]);
        let once = canonicalize(&v);
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn arrays_preserve_order() {
        let v = Value::Array(vec![Value::Int32(3), Value::Int32(1), Value::Int32(2)]);
        let c = canonicalize(&v);
        assert_eq!(c, v);
    }
}
