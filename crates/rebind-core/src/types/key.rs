//! Primary key canonicalization.
//!
//! Source stores hand out keys in several shapes: a bare scalar, an ordered
//! tuple, or a named composite. [`CanonicalKey`] folds all of them into a single
//! hashable, ordered form so two representations of the same record always
//! compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RebindError, RebindResult};

/// Raw primary key value as produced by a data source.
pub type KeyValue = serde_json::Value;

/// One scalar inside a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyScalar {
    Bool(bool),
    Int(i64),
    /// Unsigned integer above `i64::MAX`; smaller values are always `Int`.
    UInt(u64),
    Text(String),
}

/// 2^63 and 2^64 as floats. Both are exact; `i64::MAX as f64` rounds up to 2^63.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

impl KeyScalar {
    fn from_value(value: &serde_json::Value) -> RebindResult<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self::Int(i));
                }
                if let Some(u) = n.as_u64() {
                    return Ok(Self::UInt(u));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= -TWO_POW_63 && f < TWO_POW_63 => {
                        Ok(Self::Int(f as i64))
                    }
                    Some(f) if f.fract() == 0.0 && f >= TWO_POW_63 && f < TWO_POW_64 => {
                        Ok(Self::UInt(f as u64))
                    }
                    _ => Err(RebindError::invalid_key(format!(
                        "number {} is not an integral key",
                        n
                    ))),
                }
            }
            serde_json::Value::Null => Err(RebindError::invalid_key("null is not a key")),
            other => Err(RebindError::invalid_key(format!(
                "nested composite values are not supported: {}",
                other
            ))),
        }
    }

    fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::UInt(u) => serde_json::Value::from(*u),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for KeyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::UInt(u) => write!(f, "{}", u),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A single component of a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyComponent {
    /// Column name for named composites, `None` for positional parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Component value.
    pub value: KeyScalar,
}

/// Canonical, hashable form of a primary key.
///
/// `canonical(a) == canonical(b)` exactly when `a` and `b` denote the same
/// record:
/// - integral floats collapse to integers (`7.0 == 7`);
/// - a one-element list equals its bare scalar;
/// - named composites are sorted by name, so member order never matters;
/// - named and positional composites never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(Vec<KeyComponent>);

impl CanonicalKey {
    /// Canonicalize a raw key value.
    pub fn from_value(value: &KeyValue) -> RebindResult<Self> {
        let components = match value {
            serde_json::Value::Array(items) => {
                if items.is_empty() {
                    return Err(RebindError::invalid_key("empty list is not a key"));
                }
                items
                    .iter()
                    .map(|item| {
                        Ok(KeyComponent {
                            name: None,
                            value: KeyScalar::from_value(item)?,
                        })
                    })
                    .collect::<RebindResult<Vec<_>>>()?
            }
            serde_json::Value::Object(members) => {
                if members.is_empty() {
                    return Err(RebindError::invalid_key("empty object is not a key"));
                }
                let mut components = members
                    .iter()
                    .map(|(name, item)| {
                        Ok(KeyComponent {
                            name: Some(name.clone()),
                            value: KeyScalar::from_value(item)?,
                        })
                    })
                    .collect::<RebindResult<Vec<_>>>()?;
                components.sort_by(|a, b| a.name.cmp(&b.name));
                components
            }
            scalar => vec![KeyComponent {
                name: None,
                value: KeyScalar::from_value(scalar)?,
            }],
        };

        Ok(Self(components))
    }

    /// Components in canonical order.
    pub fn components(&self) -> &[KeyComponent] {
        &self.0
    }

    /// Whether this key has more than one component.
    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }

    /// Rebuild a raw key value equivalent to this key.
    ///
    /// Named composites become objects, positional composites lists, and
    /// single unnamed components bare scalars.
    pub fn to_value(&self) -> KeyValue {
        match self.0.as_slice() {
            [single] if single.name.is_none() => single.value.to_value(),
            components if components.iter().all(|c| c.name.is_some()) => {
                let mut map = serde_json::Map::new();
                for c in components {
                    if let Some(name) = &c.name {
                        map.insert(name.clone(), c.value.to_value());
                    }
                }
                serde_json::Value::Object(map)
            }
            components => {
                serde_json::Value::Array(components.iter().map(|c| c.value.to_value()).collect())
            }
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            if single.name.is_none() {
                return write!(f, "{}", single.value);
            }
        }
        write!(f, "(")?;
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &component.name {
                Some(name) => write!(f, "{}={}", name, component.value)?,
                None => write!(f, "{}", component.value)?,
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(value: serde_json::Value) -> CanonicalKey {
        CanonicalKey::from_value(&value).unwrap()
    }

    #[test]
    fn test_scalar_keys() {
        assert_eq!(key(json!(7)), key(json!(7)));
        assert_ne!(key(json!(7)), key(json!(8)));
        assert_ne!(key(json!(7)), key(json!("7")));
        assert_ne!(key(json!(true)), key(json!(1)));
    }

    #[test]
    fn test_integral_float_is_integer() {
        assert_eq!(key(json!(7.0)), key(json!(7)));
        assert!(CanonicalKey::from_value(&json!(7.5)).is_err());
    }

    #[test]
    fn test_keys_beyond_i64_stay_distinct() {
        let first_unsigned: u64 = 1 << 63;
        let max = key(json!(i64::MAX));
        let above = key(json!(first_unsigned));
        assert_ne!(max, above);
        assert_ne!(above, key(json!(u64::MAX)));
        assert_eq!(above.components()[0].value, KeyScalar::UInt(first_unsigned));
        assert_eq!(key(json!(i64::MIN)).components()[0].value, KeyScalar::Int(i64::MIN));

        // 2^63 written as a float is the same record as the integer 2^63.
        let as_float: f64 = 9_223_372_036_854_775_808.0;
        assert_eq!(key(json!(as_float)), above);
        let too_large: f64 = 1e20;
        assert!(CanonicalKey::from_value(&json!(too_large)).is_err());

        let table = crate::remap::RemapTable::new();
        assert_ne!(table.link("m", &max, None), table.link("m", &above, None));
        assert_eq!(key(above.to_value()), above);
    }

    #[test]
    fn test_single_element_list_equals_scalar() {
        assert_eq!(key(json!([42])), key(json!(42)));
        assert_eq!(key(json!(["a"])), key(json!("a")));
    }

    #[test]
    fn test_tuple_order_matters() {
        assert_eq!(key(json!([1, 2])), key(json!([1, 2])));
        assert_ne!(key(json!([1, 2])), key(json!([2, 1])));
        assert!(key(json!([1, 2])).is_composite());
    }

    #[test]
    fn test_named_composite_is_order_insensitive() {
        let a: serde_json::Value = serde_json::from_str(r#"{"order_id": 3, "line": 1}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"line": 1, "order_id": 3}"#).unwrap();
        assert_eq!(key(a), key(b));
    }

    #[test]
    fn test_named_and_positional_do_not_collide() {
        assert_ne!(key(json!({"a": 1, "b": 2})), key(json!([1, 2])));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(CanonicalKey::from_value(&json!(null)).is_err());
        assert!(CanonicalKey::from_value(&json!([])).is_err());
        assert!(CanonicalKey::from_value(&json!({})).is_err());
        assert!(CanonicalKey::from_value(&json!([[1], 2])).is_err());
        assert!(CanonicalKey::from_value(&json!([1, null])).is_err());
    }

    #[test]
    fn test_to_value_round_trips_through_canonical_form() {
        for raw in [json!(5), json!("x"), json!([1, "b"]), json!({"a": 1, "b": false})] {
            let canonical = key(raw.clone());
            assert_eq!(key(canonical.to_value()), canonical);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(key(json!(12)).to_string(), "12");
        assert_eq!(key(json!("ab")).to_string(), "\"ab\"");
        assert_eq!(key(json!([1, 2])).to_string(), "(1, 2)");
        assert_eq!(key(json!({"b": 2, "a": "x"})).to_string(), "(a=\"x\", b=2)");
    }

    #[test]
    fn test_hash_map_usage() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(key(json!([9])), "nine");
        assert_eq!(map.get(&key(json!(9.0))), Some(&"nine"));
    }
}
