//! Ordered key/value dimensions attached to metric events.

use indexmap::IndexMap;
use std::fmt;

/// Value of a single dimension.
#[derive(Clone, Debug, PartialEq)]
pub enum DimensionValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionValue::Str(s) => f.write_str(s),
            DimensionValue::Int(v) => write!(f, "{}", v),
            DimensionValue::UInt(v) => write!(f, "{}", v),
            DimensionValue::Float(v) => crate::encoder::write_float(f, *v),
            DimensionValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for DimensionValue {
    fn from(v: &str) -> Self {
        DimensionValue::Str(v.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(v: String) -> Self {
        DimensionValue::Str(v)
    }
}

impl From<&String> for DimensionValue {
    fn from(v: &String) -> Self {
        DimensionValue::Str(v.clone())
    }
}

macro_rules! dimension_value_from {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for DimensionValue {
                fn from(v: $t) -> Self {
                    DimensionValue::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

dimension_value_from!(Int, i64, i8, i16, i32, i64);
dimension_value_from!(UInt, u64, u8, u16, u32, u64);
dimension_value_from!(Float, f64, f32, f64);
dimension_value_from!(Bool, bool, bool);

/// Insertion-ordered set of dimensions.
///
/// Iteration order is the order in which keys were first inserted, which keeps the
/// encoded payload reproducible. Keys and values must not contain any of the wire
/// delimiters (`:`, `|`, `#`, `,`); no escaping is performed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dimensions {
    inner: IndexMap<String, DimensionValue>,
}

impl Dimensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a dimension. An existing key keeps its position and takes the new value.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<DimensionValue>
    where
        K: Into<String>,
        V: Into<DimensionValue>,
    {
        self.inner.insert(key.into(), value.into())
    }

    /// Chained form of [`insert`](Self::insert).
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<DimensionValue>,
    {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DimensionValue> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DimensionValue)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy of `self` overlaid with `overrides`; `self` is left untouched.
    ///
    /// Keys already present keep their position, keys new to `self` are appended in
    /// the order they appear in `overrides`.
    pub fn merge(&self, overrides: &Dimensions) -> Dimensions {
        let mut merged = self.clone();
        for (k, v) in overrides.inner.iter() {
            merged.inner.insert(k.clone(), v.clone());
        }

        merged
    }

    /// Like [`merge`](Self::merge), treating `None` as an empty override set.
    pub fn merge_opt(&self, overrides: Option<&Dimensions>) -> Dimensions {
        match overrides {
            Some(overrides) => self.merge(overrides),
            None => self.clone(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Dimensions
where
    K: Into<String>,
    V: Into<DimensionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dims = Dimensions::new();
        for (k, v) in iter {
            dims.insert(k, v);
        }

        dims
    }
}

impl<K, V> Extend<(K, V)> for Dimensions
where
    K: Into<String>,
    V: Into<DimensionValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// Builds a [`Dimensions`](crate::Dimensions) set from `key => value` pairs.
///
/// ```
/// let dims = monasca_statsd::dimensions! { "env" => "test", "shard" => 3 };
/// assert_eq!(2, dims.len());
/// ```
#[macro_export]
macro_rules! dimensions {
    () => {
        $crate::Dimensions::new()
    };

    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut dims = $crate::Dimensions::new();
        $(
            dims.insert($key, $value);
        )+
        dims
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_without_mutating_defaults() {
        let defaults = dimensions! { "env" => "test", "date" => "10/24" };
        let overrides = dimensions! { "color" => "red", "env" => "prod" };

        let merged = defaults.merge(&overrides);

        let keys: Vec<_> = merged.iter().map(|(k, _)| k).collect();
        assert_eq!(vec!["env", "date", "color"], keys);
        assert_eq!(Some(&DimensionValue::from("prod")), merged.get("env"));

        assert_eq!(2, defaults.len());
        assert_eq!(Some(&DimensionValue::from("test")), defaults.get("env"));
    }

    #[test]
    fn merge_opt_none_is_copy() {
        let defaults = dimensions! { "a" => 1 };
        assert_eq!(defaults, defaults.merge_opt(None));
    }

    #[test]
    fn scalar_values() {
        let dims = dimensions! {
            "i" => -3,
            "u" => 7u32,
            "f" => 1.5,
            "b" => true,
        };

        let rendered: Vec<_> = dims.iter().map(|(_, v)| v.to_string()).collect();
        assert_eq!(vec!["-3", "7", "1.5", "true"], rendered);
    }

    #[test]
    fn collect_from_pairs() {
        let dims: Dimensions = vec![("a", "x"), ("b", "y"), ("a", "z")].into_iter().collect();
        assert_eq!(2, dims.len());
        assert_eq!(Some(&DimensionValue::from("z")), dims.get("a"));
    }
}
