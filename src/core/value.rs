use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A primary or foreign key value read from an entity property.
///
/// A missing (null) key is represented by `None` at the call site rather than
/// by a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    Integer(i64),
    Text(String),
    Uuid(Uuid),
}

impl KeyValue {
    /// Returns the form of this key used for matching under `comparison`.
    pub fn normalized(&self, comparison: KeyComparison) -> KeyValue {
        match (self, comparison) {
            (Self::Text(s), KeyComparison::Normalized) => Self::Text(fold_text_key(s)),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

/// How string keys are compared when foreign keys are matched to primary keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyComparison {
    /// Case-insensitive, with full-width ASCII forms folded to their
    /// half-width equivalents.
    #[default]
    Normalized,
    Exact,
}

fn fold_text_key(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Conversion of a scalar entity field into a [`KeyValue`].
///
/// Implemented for the scalar types commonly used as keys; `#[tracking(key)]`
/// fields must implement it.
pub trait ToKeyValue {
    fn to_key_value(&self) -> Option<KeyValue>;
}

macro_rules! integer_key {
    ($($ty:ty),*) => {
        $(
            impl ToKeyValue for $ty {
                fn to_key_value(&self) -> Option<KeyValue> {
                    i64::try_from(*self).ok().map(KeyValue::Integer)
                }
            }
        )*
    };
}

integer_key!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl ToKeyValue for String {
    fn to_key_value(&self) -> Option<KeyValue> {
        Some(KeyValue::Text(self.clone()))
    }
}

impl ToKeyValue for &str {
    fn to_key_value(&self) -> Option<KeyValue> {
        Some(KeyValue::Text((*self).to_string()))
    }
}

impl ToKeyValue for Uuid {
    fn to_key_value(&self) -> Option<KeyValue> {
        Some(KeyValue::Uuid(*self))
    }
}

impl ToKeyValue for KeyValue {
    fn to_key_value(&self) -> Option<KeyValue> {
        Some(self.clone())
    }
}

impl<T: ToKeyValue> ToKeyValue for Option<T> {
    fn to_key_value(&self) -> Option<KeyValue> {
        self.as_ref().and_then(ToKeyValue::to_key_value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for KeyValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}
