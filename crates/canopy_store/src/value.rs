//! Attribute values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{Cursor, Read};

use crate::error::{StoreError, StoreResult};

/// The type of an attribute value.
///
/// The numeric codes are stable and appear in fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    /// UTF-8 text.
    String = 1,
    /// Opaque bytes.
    Binary = 2,
    /// 64-bit signed integer.
    Long = 3,
    /// 64-bit float.
    Double = 4,
    /// Point in time.
    Date = 5,
    /// Boolean.
    Boolean = 6,
    /// Qualified name.
    Name = 7,
    /// Content path.
    Path = 8,
    /// Strong reference to another node.
    Reference = 9,
    /// Weak reference to another node.
    WeakReference = 10,
    /// URI.
    Uri = 11,
    /// Arbitrary precision decimal, kept in its textual form.
    Decimal = 12,
}

impl PropertyType {
    /// Returns the stable numeric code of this type.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Binary content shared between the store and its readers.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Binary(Bytes);

impl Binary {
    /// Wraps the given bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the binary has no content.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Opens a reader over the content. The reader holds its own handle
    /// to the shared buffer and releases it when dropped.
    pub fn stream(&self) -> impl Read + Send + 'static {
        Cursor::new(self.0.clone())
    }

    /// Borrows the content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binary({} bytes)", self.0.len())
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Binary::new)
            .map_err(serde::de::Error::custom)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    /// Text.
    String(String),
    /// Binary content.
    Binary(Binary),
    /// Integer.
    Long(i64),
    /// Float.
    Double(f64),
    /// Decimal in textual form.
    Decimal(String),
    /// Timestamp.
    Date(DateTime<Utc>),
    /// Boolean.
    Boolean(bool),
    /// Qualified name.
    Name(String),
    /// Path.
    Path(String),
    /// Strong reference.
    Reference(String),
    /// Weak reference.
    WeakReference(String),
    /// URI.
    Uri(String),
}

impl Value {
    /// Returns the type of this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::String(_) => PropertyType::String,
            Value::Binary(_) => PropertyType::Binary,
            Value::Long(_) => PropertyType::Long,
            Value::Double(_) => PropertyType::Double,
            Value::Decimal(_) => PropertyType::Decimal,
            Value::Date(_) => PropertyType::Date,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::Name(_) => PropertyType::Name,
            Value::Path(_) => PropertyType::Path,
            Value::Reference(_) => PropertyType::Reference,
            Value::WeakReference(_) => PropertyType::WeakReference,
            Value::Uri(_) => PropertyType::Uri,
        }
    }

    /// Returns the text of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s)
            | Value::Decimal(s)
            | Value::Name(s)
            | Value::Path(s)
            | Value::Reference(s)
            | Value::WeakReference(s)
            | Value::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp of a date value.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// An attribute: either one value or a typed list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    /// Single-valued attribute.
    Single(Value),
    /// Multi-valued attribute; all values share `element_type`.
    Multiple {
        /// Type of every element.
        element_type: PropertyType,
        /// The values, in stored order.
        values: Vec<Value>,
    },
}

impl Property {
    /// Creates a multi-valued attribute, checking that all values have `element_type`.
    pub fn multiple(element_type: PropertyType, values: Vec<Value>) -> StoreResult<Self> {
        if let Some(bad) = values.iter().find(|v| v.property_type() != element_type) {
            return Err(StoreError::TypeMismatch {
                expected: element_type,
                found: bad.property_type(),
            });
        }
        Ok(Property::Multiple {
            element_type,
            values,
        })
    }

    /// Single string attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Property::Single(Value::String(value.into()))
    }

    /// Single long attribute.
    pub fn long(value: i64) -> Self {
        Property::Single(Value::Long(value))
    }

    /// Single boolean attribute.
    pub fn boolean(value: bool) -> Self {
        Property::Single(Value::Boolean(value))
    }

    /// Single date attribute.
    pub fn date(value: DateTime<Utc>) -> Self {
        Property::Single(Value::Date(value))
    }

    /// Single binary attribute.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Property::Single(Value::Binary(Binary::new(data)))
    }

    /// Multi-valued string attribute.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Property::Multiple {
            element_type: PropertyType::String,
            values: values.into_iter().map(|s| Value::String(s.into())).collect(),
        }
    }

    /// Multi-valued name attribute, as used for mixin lists.
    pub fn names<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Property::Multiple {
            element_type: PropertyType::Name,
            values: values.into_iter().map(|s| Value::Name(s.into())).collect(),
        }
    }

    /// Returns the type of the attribute's values.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Property::Single(v) => v.property_type(),
            Property::Multiple { element_type, .. } => *element_type,
        }
    }

    /// Returns true for multi-valued attributes.
    pub fn is_multiple(&self) -> bool {
        matches!(self, Property::Multiple { .. })
    }

    /// Returns all values; a single value is returned as a one-element slice.
    pub fn values(&self) -> &[Value] {
        match self {
            Property::Single(v) => std::slice::from_ref(v),
            Property::Multiple { values, .. } => values,
        }
    }

    /// Returns the text of a single string-like value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::Single(v) => v.as_str(),
            Property::Multiple { .. } => None,
        }
    }

    /// Returns true if any value's text equals `needle`.
    pub fn contains_str(&self, needle: &str) -> bool {
        self.values().iter().any(|v| v.as_str() == Some(needle))
    }
}
