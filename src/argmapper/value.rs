//! Typed values and the per-call value set.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A Rust type with a stable semantic type identifier.
///
/// The identifier is what specs and wire payloads carry; it names a
/// semantic type, not a representation.
pub trait Typed: Any + Send + Sync {
    const TYPE: &'static str;
}

impl Typed for CancellationToken {
    const TYPE: &'static str = "context.Cancellation";
}

/// Errors when reading or encoding a [`Value`].
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("value of type `{found}` cannot be read as `{expected}`")]
    TypeMismatch { expected: String, found: String },

    #[error("value of type `{0}` has no wire encoding")]
    NotEncodable(String),

    #[error("codec error for type `{type_name}`: {error}")]
    Codec {
        type_name: String,
        error: serde_json::Error,
    },
}

type Encoder = fn(&(dyn Any + Send + Sync)) -> Option<Result<JsonValue, serde_json::Error>>;

fn encode_as<T: Serialize + 'static>(
    value: &(dyn Any + Send + Sync),
) -> Option<Result<JsonValue, serde_json::Error>> {
    value.downcast_ref::<T>().map(serde_json::to_value)
}

/// A value that arrived over the wire and has not been decoded yet.
#[derive(Debug, Clone)]
struct Wire(JsonValue);

fn encode_wire(value: &(dyn Any + Send + Sync)) -> Option<Result<JsonValue, serde_json::Error>> {
    value.downcast_ref::<Wire>().map(|w| Ok(w.0.clone()))
}

/// One typed value: a type identifier, an optional name tag and the payload.
#[derive(Clone)]
pub struct Value {
    type_name: String,
    name: Option<String>,
    inner: Arc<dyn Any + Send + Sync>,
    encoder: Option<Encoder>,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("encodable", &self.encoder.is_some())
            .finish()
    }
}

impl Value {
    /// Wrap a [`Typed`] value that stays on this side of the boundary.
    pub fn typed<T: Typed>(value: T) -> Self {
        Self::with_type(T::TYPE, value)
    }

    /// Wrap a [`Typed`] value that may also be sent over the wire.
    pub fn serializable<T: Typed + Serialize>(value: T) -> Self {
        let mut v = Self::typed(value);
        v.encoder = Some(encode_as::<T>);
        v
    }

    /// Wrap any value under an explicit type identifier.
    pub fn with_type<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
            inner: Arc::new(value),
            encoder: None,
        }
    }

    /// A value decoded from a wire payload; decoded lazily by [`decode`](Self::decode).
    pub fn wire(type_name: impl Into<String>, json: JsonValue) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
            inner: Arc::new(Wire(json)),
            encoder: Some(encode_wire),
        }
    }

    /// Tag this value with a name so it only satisfies the same-named argument.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Drop the name tag so the value satisfies any argument of its type.
    pub fn unnamed(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Borrow the payload as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Clone the payload out as `T`.
    pub fn get<T: Any + Clone>(&self) -> Result<T, ValueError> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| self.mismatch::<T>())
    }

    /// Read the payload as `T`, decoding it first if it came over the wire.
    pub fn decode<T: Any + Clone + DeserializeOwned>(&self) -> Result<T, ValueError> {
        if let Some(v) = self.downcast_ref::<T>() {
            return Ok(v.clone());
        }
        match self.downcast_ref::<Wire>() {
            Some(Wire(json)) => {
                serde_json::from_value(json.clone()).map_err(|error| ValueError::Codec {
                    type_name: self.type_name.clone(),
                    error,
                })
            }
            None => Err(self.mismatch::<T>()),
        }
    }

    /// Encode the payload for the wire.
    pub fn encode(&self) -> Result<JsonValue, ValueError> {
        let encoder = self
            .encoder
            .ok_or_else(|| ValueError::NotEncodable(self.type_name.clone()))?;
        match encoder(self.inner.as_ref()) {
            Some(Ok(json)) => Ok(json),
            Some(Err(error)) => Err(ValueError::Codec {
                type_name: self.type_name.clone(),
                error,
            }),
            None => Err(ValueError::NotEncodable(self.type_name.clone())),
        }
    }

    fn mismatch<T>(&self) -> ValueError {
        ValueError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            found: self.type_name.clone(),
        }
    }
}

/// The working set of typed values for one call.
///
/// Insertion order is significant: it breaks ties between equally good
/// matches.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    values: Vec<Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a value.
    pub fn with(mut self, value: Value) -> Self {
        self.push(value);
        self
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Find the value for an argument called `name` of type `type_name`.
    ///
    /// A value tagged with the same name wins over an untagged one; a value
    /// tagged with a different name never matches.
    pub fn find(&self, name: &str, type_name: &str) -> Option<&Value> {
        let mut anonymous = None;
        for value in self.values.iter().filter(|v| v.type_name == type_name) {
            match value.name.as_deref() {
                Some(n) if n == name => return Some(value),
                Some(_) => {}
                None => {
                    if anonymous.is_none() {
                        anonymous = Some(value);
                    }
                }
            }
        }
        anonymous
    }

    /// Whether any untagged value of `type_name` is present.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.values
            .iter()
            .any(|v| v.type_name == type_name && v.name.is_none())
    }
}

impl Extend<Value> for ValueSet {
    fn extend<I: IntoIterator<Item = Value>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl FromIterator<Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ValueSet {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Region(String);

    impl Typed for Region {
        const TYPE: &'static str = "test.Region";
    }

    #[test]
    fn test_named_value_wins_over_anonymous() {
        let set = ValueSet::new()
            .with(Value::typed(Region("anywhere".into())))
            .with(Value::typed(Region("eu".into())).named("primary"));

        let found = set.find("primary", Region::TYPE).unwrap();
        assert_eq!(found.get::<Region>().unwrap(), Region("eu".into()));

        let fallback = set.find("secondary", Region::TYPE).unwrap();
        assert_eq!(fallback.get::<Region>().unwrap(), Region("anywhere".into()));
    }

    #[test]
    fn test_named_value_never_satisfies_other_name() {
        let set = ValueSet::new().with(Value::typed(Region("eu".into())).named("primary"));
        assert!(set.find("backup", Region::TYPE).is_none());
        assert!(!set.has_type(Region::TYPE));
    }

    #[test]
    fn test_first_inserted_anonymous_value_wins() {
        let set = ValueSet::new()
            .with(Value::typed(Region("first".into())))
            .with(Value::typed(Region("second".into())));
        let found = set.find("region", Region::TYPE).unwrap();
        assert_eq!(found.get::<Region>().unwrap().0, "first");
    }

    #[test]
    fn test_wire_value_decodes_on_demand() {
        let local = Value::serializable(Region("us".into()));
        let json = local.encode().unwrap();

        let remote = Value::wire(Region::TYPE, json);
        assert!(remote.get::<Region>().is_err());
        assert_eq!(remote.decode::<Region>().unwrap(), Region("us".into()));
        assert_eq!(remote.encode().unwrap(), serde_json::json!("us"));
    }

    #[test]
    fn test_local_only_value_is_not_encodable() {
        let value = Value::typed(CancellationToken::new());
        assert!(matches!(value.encode(), Err(ValueError::NotEncodable(_))));
    }
}
