//! Declarative shape descriptions.
//!
//! A [`Schema`] is a named, ordered list of [`Field`]s. Each field carries a
//! [`Shape`] describing what the raw value must look like and, optionally, a
//! [`DefaultValue`] used when the file does not provide one.
//!
//! # Example
//!
//! ```
//! use tessera_config::{CommandOverride, Field, Primitive, Schema, Shape};
//!
//! let database = Schema::new("Database")
//!     .with_field(Field::new("host", Shape::string()).with_default("127.0.0.1"))
//!     .with_field(Field::new("port", Shape::Override(
//!         CommandOverride::new("port").with_kind(Primitive::Integer).with_default(3306),
//!     )))
//!     .with_field(Field::new("replicas", Shape::list_of(Shape::string())));
//!
//! let config = Schema::new("Config").with_field(Field::new("database", Shape::nested(database)));
//! assert_eq!(config.fields().len(), 1);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value as Json;

use crate::arg::CommandOverride;
use crate::node::Value;
use crate::ConfigError;

/// Scalar type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Any value, rendered as text.
    String,
    /// Integer, or text holding a product of integers (`"3600 * 8"`).
    Integer,
    /// Floating point number, or numeric text.
    Float,
    /// Truthiness of any value.
    Boolean,
}

impl Primitive {
    /// Returns `true` if the raw value already has this runtime type.
    pub fn accepts(self, raw: &Json) -> bool {
        match (self, raw) {
            (Primitive::String, Json::String(_)) | (Primitive::Boolean, Json::Bool(_)) => true,
            (Primitive::Integer, Json::Number(n)) => !n.is_f64(),
            (Primitive::Float, Json::Number(n)) => n.is_f64(),
            _ => false,
        }
    }

    /// Coerce a raw value to this type.
    ///
    /// # Errors
    ///
    /// Returns a schema error for integers and floats that cannot be
    /// converted. Strings and booleans always succeed.
    pub fn coerce(self, raw: &Json) -> Result<Value, ConfigError> {
        match self {
            Primitive::String => Ok(Value::Str(match raw {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            })),
            Primitive::Integer => match raw {
                Json::Number(n) if !n.is_f64() => Ok(n
                    .as_i64()
                    .map(Value::Int)
                    .or_else(|| n.as_u64().map(Value::UInt))
                    .unwrap_or_default()),
                Json::String(s) if integer_expression().is_match(s) => {
                    evaluate_product(s).map(Value::Int).ok_or_else(|| {
                        ConfigError::type_mismatch("integer", format!("cannot evaluate `{s}`"))
                    })
                }
                other => Err(ConfigError::type_mismatch(
                    "integer",
                    format!("expected integer, found {}", json_kind(other)),
                )),
            },
            Primitive::Float => match raw {
                Json::Number(n) => n.as_f64().map(Value::Float).ok_or_else(|| {
                    ConfigError::type_mismatch("float", format!("{n} is out of range"))
                }),
                Json::String(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    ConfigError::type_mismatch("float", format!("cannot parse `{s}` as float"))
                }),
                other => Err(ConfigError::type_mismatch(
                    "float",
                    format!("expected float, found {}", json_kind(other)),
                )),
            },
            Primitive::Boolean => Ok(Value::Bool(truthy(raw))),
        }
    }

    /// Coerce a mapping key, returning its normalized text.
    pub fn coerce_key(self, key: &str) -> Result<String, ConfigError> {
        self.coerce(&Json::String(key.to_string()))
            .map(|value| value.to_string())
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
        })
    }
}

fn integer_expression() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\d\s*]+$").expect("valid regex"))
}

/// Evaluate `a * b * ...` over integer factors. `None` on empty factors or overflow.
fn evaluate_product(text: &str) -> Option<i64> {
    text.split('*').try_fold(1_i64, |acc, factor| {
        let factor: i64 = factor.trim().parse().ok()?;
        acc.checked_mul(factor)
    })
}

fn truthy(raw: &Json) -> bool {
    match raw {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(items) => !items.is_empty(),
        Json::Object(entries) => !entries.is_empty(),
    }
}

/// Short name of a raw value's runtime kind.
pub(crate) fn json_kind(raw: &Json) -> &'static str {
    match raw {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_f64() => "float",
        Json::Number(_) => "integer",
        Json::String(_) => "string",
        Json::Array(_) => "sequence",
        Json::Object(_) => "mapping",
    }
}

/// Expected shape of a value.
#[derive(Debug, Clone)]
pub enum Shape {
    /// A scalar coerced by the primitive table.
    Primitive(Primitive),
    /// Only `null`.
    Null,
    /// Anything, materialized untyped.
    Any,
    /// A sequence whose items all have the inner shape.
    ListOf(Box<Shape>),
    /// A mapping with coerced keys and values of the inner shape.
    MapOf(Primitive, Box<Shape>),
    /// The first alternative whose runtime kind matches.
    OneOf(Union),
    /// A nested schema.
    Nested(Arc<Schema>),
    /// A value that may come from the command line.
    Override(CommandOverride),
}

impl Shape {
    /// `Primitive(String)`.
    pub fn string() -> Self {
        Shape::Primitive(Primitive::String)
    }

    /// `Primitive(Integer)`.
    pub fn integer() -> Self {
        Shape::Primitive(Primitive::Integer)
    }

    /// `Primitive(Float)`.
    pub fn float() -> Self {
        Shape::Primitive(Primitive::Float)
    }

    /// `Primitive(Boolean)`.
    pub fn boolean() -> Self {
        Shape::Primitive(Primitive::Boolean)
    }

    /// A homogeneous sequence.
    pub fn list_of(item: Shape) -> Self {
        Shape::ListOf(Box::new(item))
    }

    /// A homogeneous mapping.
    pub fn map_of(key: Primitive, value: Shape) -> Self {
        Shape::MapOf(key, Box::new(value))
    }

    /// A union without a fallback branch.
    pub fn one_of(alternatives: impl IntoIterator<Item = Shape>) -> Self {
        Shape::OneOf(Union::new(alternatives))
    }

    /// `inner` or `null`.
    pub fn optional(inner: Shape) -> Self {
        Shape::one_of([inner, Shape::Null])
    }

    /// A nested schema.
    pub fn nested(schema: Schema) -> Self {
        Shape::Nested(Arc::new(schema))
    }

    /// Returns `true` if a raw value of this runtime kind can take this branch of a union.
    pub fn accepts(&self, raw: &Json) -> bool {
        match self {
            Shape::Primitive(primitive) => primitive.accepts(raw),
            Shape::Null => raw.is_null(),
            Shape::Any => true,
            Shape::ListOf(_) => raw.is_array(),
            Shape::MapOf(..) | Shape::Nested(_) => raw.is_object(),
            Shape::OneOf(union) => union.alternatives.iter().any(|alt| alt.accepts(raw)),
            Shape::Override(_) => false,
        }
    }
}

impl From<Primitive> for Shape {
    fn from(primitive: Primitive) -> Self {
        Shape::Primitive(primitive)
    }
}

impl From<Schema> for Shape {
    fn from(schema: Schema) -> Self {
        Shape::nested(schema)
    }
}

impl From<CommandOverride> for Shape {
    fn from(binding: CommandOverride) -> Self {
        Shape::Override(binding)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Primitive(primitive) => write!(f, "{primitive}"),
            Shape::Null => f.write_str("null"),
            Shape::Any => f.write_str("any"),
            Shape::ListOf(item) => write!(f, "list of {item}"),
            Shape::MapOf(key, value) => write!(f, "map of {key} to {value}"),
            Shape::OneOf(union) => {
                f.write_str("one of [")?;
                for (i, alt) in union.alternatives.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{alt}")?;
                }
                f.write_str("]")
            }
            Shape::Nested(schema) => f.write_str(&schema.name),
            Shape::Override(binding) => write!(f, "{binding}"),
        }
    }
}

/// Alternatives of a [`Shape::OneOf`], tried in declaration order.
///
/// When no alternative matches the raw value's runtime kind, the fallback
/// alternative (if one was designated) is resolved with the raw value.
#[derive(Debug, Clone)]
pub struct Union {
    alternatives: Vec<Shape>,
    fallback: Option<usize>,
}

impl Union {
    /// A union without a fallback.
    pub fn new(alternatives: impl IntoIterator<Item = Shape>) -> Self {
        Self {
            alternatives: alternatives.into_iter().collect(),
            fallback: None,
        }
    }

    /// Designate the alternative at `index` as the fallback branch.
    ///
    /// An index past the last alternative leaves the union without a fallback.
    #[must_use]
    pub fn with_fallback(mut self, index: usize) -> Self {
        self.fallback = Some(index);
        self
    }

    /// Alternatives in declaration order.
    pub fn alternatives(&self) -> &[Shape] {
        &self.alternatives
    }

    /// The designated fallback alternative.
    pub fn fallback(&self) -> Option<&Shape> {
        self.fallback.and_then(|i| self.alternatives.get(i))
    }
}

/// Value used when a field is absent from the file.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value, coerced against the field's shape.
    Literal(Json),
    /// Called only when the default is needed.
    Producer(Arc<dyn Fn() -> Json + Send + Sync>),
    /// A nested schema resolved against an empty mapping.
    Nested(Arc<Schema>),
}

impl DefaultValue {
    /// A lazily evaluated default.
    pub fn producer(f: impl Fn() -> Json + Send + Sync + 'static) -> Self {
        DefaultValue::Producer(Arc::new(f))
    }

    /// A default built from a nested schema's own defaults.
    pub fn nested(schema: Schema) -> Self {
        DefaultValue::Nested(Arc::new(schema))
    }

    /// The plain value for literal and producer defaults.
    pub fn evaluate(&self) -> Option<Json> {
        match self {
            DefaultValue::Literal(value) => Some(value.clone()),
            DefaultValue::Producer(produce) => Some(produce()),
            DefaultValue::Nested(_) => None,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
            DefaultValue::Nested(schema) => f.debug_tuple("Nested").field(&schema.name).finish(),
        }
    }
}

impl From<Json> for DefaultValue {
    fn from(value: Json) -> Self {
        DefaultValue::Literal(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Literal(Json::from(value))
    }
}

impl From<Schema> for DefaultValue {
    fn from(schema: Schema) -> Self {
        DefaultValue::nested(schema)
    }
}

/// One named entry of a [`Schema`].
#[derive(Debug, Clone)]
pub struct Field {
    key: String,
    shape: Option<Shape>,
    default: Option<DefaultValue>,
}

impl Field {
    /// A required field of the given shape.
    pub fn new(key: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self {
            key: key.into(),
            shape: Some(shape.into()),
            default: None,
        }
    }

    /// A field with a default but no declared shape; materialized untyped.
    pub fn untyped(key: impl Into<String>, default: impl Into<DefaultValue>) -> Self {
        Self {
            key: key.into(),
            shape: None,
            default: Some(default.into()),
        }
    }

    /// Set the default used when the key is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The mapping key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The declared shape, if any.
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// The declared default, if any.
    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }
}

/// A named set of fields describing one configuration section.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    /// An empty schema. `name` appears in error paths.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// The schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_passthrough_and_expression() {
        assert_eq!(Primitive::Integer.coerce(&json!(42)).unwrap(), Value::Int(42));
        assert_eq!(
            Primitive::Integer.coerce(&json!("3600 * 8")).unwrap(),
            Value::Int(28800)
        );
        assert_eq!(Primitive::Integer.coerce(&json!(" 17 ")).unwrap(), Value::Int(17));
    }

    #[test]
    fn test_integer_rejects_other_text() {
        for raw in [json!("ten"), json!("2 ** 3"), json!("36 00"), json!(1.5), json!(true)] {
            let err = Primitive::Integer.coerce(&raw).unwrap_err();
            assert_eq!(err.as_schema().unwrap().expected(), "integer", "{raw}");
        }
    }

    #[test]
    fn test_integer_accepts_unsigned_range() {
        let raw = json!(u64::MAX);
        assert!(Primitive::Integer.accepts(&raw));
        assert_eq!(Primitive::Integer.coerce(&raw).unwrap(), Value::UInt(u64::MAX));
    }

    #[test]
    fn test_integer_expression_overflow() {
        let raw = json!("9223372036854775807 * 2");
        assert!(Primitive::Integer.coerce(&raw).is_err());
    }

    #[test]
    fn test_string_conversion_always_succeeds() {
        assert_eq!(Primitive::String.coerce(&json!(5)).unwrap(), Value::from("5"));
        assert_eq!(Primitive::String.coerce(&json!(true)).unwrap(), Value::from("true"));
        assert_eq!(Primitive::String.coerce(&json!("x")).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(Primitive::Float.coerce(&json!(2)).unwrap(), Value::Float(2.0));
        assert_eq!(Primitive::Float.coerce(&json!("0.25")).unwrap(), Value::Float(0.25));
        assert!(Primitive::Float.coerce(&json!("fast")).is_err());
    }

    #[test]
    fn test_boolean_truthiness() {
        assert_eq!(Primitive::Boolean.coerce(&json!(0)).unwrap(), Value::Bool(false));
        assert_eq!(Primitive::Boolean.coerce(&json!("")).unwrap(), Value::Bool(false));
        assert_eq!(Primitive::Boolean.coerce(&json!(null)).unwrap(), Value::Bool(false));
        assert_eq!(Primitive::Boolean.coerce(&json!([1])).unwrap(), Value::Bool(true));
        assert_eq!(Primitive::Boolean.coerce(&json!("no")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_coerce_key() {
        assert_eq!(Primitive::Integer.coerce_key("8 * 2").unwrap(), "16");
        assert_eq!(Primitive::String.coerce_key("name").unwrap(), "name");
        assert!(Primitive::Integer.coerce_key("name").is_err());
    }

    #[test]
    fn test_shape_accepts() {
        assert!(Shape::integer().accepts(&json!(1)));
        assert!(!Shape::integer().accepts(&json!("1")));
        assert!(Shape::float().accepts(&json!(1.0)));
        assert!(Shape::list_of(Shape::Any).accepts(&json!([])));
        assert!(Shape::nested(Schema::new("S")).accepts(&json!({})));
        assert!(Shape::optional(Shape::string()).accepts(&json!(null)));
    }

    #[test]
    fn test_shape_display() {
        let shape = Shape::map_of(Primitive::String, Shape::list_of(Shape::integer()));
        assert_eq!(shape.to_string(), "map of string to list of integer");
        assert_eq!(
            Shape::optional(Shape::nested(Schema::new("Db"))).to_string(),
            "one of [Db, null]"
        );
    }

    #[test]
    fn test_union_fallback_index() {
        let union = Union::new([Shape::integer(), Shape::string()]).with_fallback(1);
        assert!(matches!(union.fallback(), Some(Shape::Primitive(Primitive::String))));
        assert!(Union::new([Shape::Null]).with_fallback(4).fallback().is_none());
    }

    #[test]
    fn test_default_evaluation_is_lazy() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let default = DefaultValue::producer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            json!(7)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(default.evaluate(), Some(json!(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
