//! Formatting attributes attached to inserts and retains.
//!
//! Keys are format names (`bold`, `color`, `background`, `header`, ...),
//! values are arbitrary JSON. Inside a retain, a `null` value removes the
//! format from the retained span.

use std::collections::BTreeMap;

use serde_json::Value;

/// Ordered format map. Ordering keeps serialization and equality stable.
pub type Attributes = BTreeMap<String, Value>;

/// Build an [`Attributes`] map from `key => value` pairs.
///
/// ```
/// let attrs = quire_core::attrs! { "bold" => true, "color" => "#003700" };
/// assert_eq!(attrs.len(), 2);
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::attributes::Attributes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::attributes::Attributes::from([
            $((::std::string::String::from($key), $crate::__Value::from($value))),+
        ])
    };
}

/// Layer `b` over `a`.
///
/// Keys in `b` win. When `keep_null` is false, `null` entries are dropped
/// from the result, which is what an insert wants; a retain keeps them so
/// the removal still applies when it is composed further.
pub fn compose_attributes(a: &Attributes, b: &Attributes, keep_null: bool) -> Attributes {
    let mut out = b.clone();
    if !keep_null {
        out.retain(|_, v| !v.is_null());
    }
    for (key, value) in a {
        if !b.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// The attribute change turning `a` into `b`.
///
/// Keys present in `a` but missing from `b` map to `null`.
pub fn diff_attributes(a: &Attributes, b: &Attributes) -> Attributes {
    a.keys()
        .chain(b.keys())
        .filter(|key| a.get(*key) != b.get(*key))
        .map(|key| (key.clone(), b.get(key).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Whether a format is switched on (`true` or a non-empty string).
pub fn is_enabled(attrs: &Attributes, key: &str) -> bool {
    match attrs.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}
