//! Schema-directed materialization.
//!
//! The [`Resolver`] walks a decoded document against a [`Shape`], producing
//! a detached [`Value`] tree. Failures carry the schema path and field path
//! to the offending value; a failed resolution never yields a partial tree.

use std::env;
use std::ffi::OsString;

use indexmap::IndexMap;

use serde_json::{Map as JsonMap, Value as Json};

use crate::arg::CommandOverride;
use crate::node::{materialize, ConfigList, ConfigMap, Value};
use crate::schema::{json_kind, DefaultValue, Field, Primitive, Schema, Shape, Union};
use crate::ConfigError;

/// Resolves raw documents against shapes.
///
/// Holds the argument list consulted by [`CommandOverride`] fields.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tessera_config::{Field, Resolver, Schema, Shape};
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let schema = Schema::new("Config")
///     .with_field(Field::new("workers", Shape::integer()).with_default(4))
///     .with_field(Field::new("ttl", Shape::integer()));
///
/// let root = Resolver::with_args(Vec::<String>::new())
///     .resolve_schema(&json!({"ttl": "3600 * 8", "extra": true}), &schema)?;
///
/// assert_eq!(root.get_i64("workers"), Some(4));
/// assert_eq!(root.get_i64("ttl"), Some(28800));
/// assert_eq!(root.get_bool("extra"), Some(true));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    args: Vec<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// A resolver reading overrides from the process arguments.
    ///
    /// Arguments that are not valid Unicode are converted lossily.
    pub fn new() -> Self {
        Self::from_os_args(env::args_os().skip(1))
    }

    fn from_os_args(args: impl IntoIterator<Item = OsString>) -> Self {
        Self {
            args: args
                .into_iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        }
    }

    /// A resolver reading overrides from `args` (program name excluded).
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The argument list consulted by overrides.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Resolve `raw` against `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when the value does not fit the shape,
    /// or [`ConfigError::MissingArgument`] from an override flag.
    pub fn resolve(&self, raw: &Json, shape: &Shape) -> Result<Value, ConfigError> {
        match shape {
            Shape::Primitive(primitive) => primitive.coerce(raw),
            Shape::Null => match raw {
                Json::Null => Ok(Value::Null),
                other => Err(ConfigError::type_mismatch(
                    "null",
                    format!("expected null, found {}", json_kind(other)),
                )),
            },
            Shape::Any => Ok(materialize(raw)),
            Shape::ListOf(item) => self.resolve_list(raw, item, shape),
            Shape::MapOf(key, value) => self.resolve_map(raw, *key, value, shape),
            Shape::OneOf(union) => self.resolve_union(raw, union, shape),
            Shape::Nested(schema) => self.resolve_schema(raw, schema).map(Value::Map),
            Shape::Override(binding) => {
                let provided = (!raw.is_null()).then_some(raw);
                self.resolve_override(binding, provided, None)?
                    .ok_or_else(|| ConfigError::type_mismatch(binding.to_string(), "missing config"))
            }
        }
    }

    /// Resolve a mapping against `schema`.
    ///
    /// Declared fields are resolved in order, then shape-less defaults, then
    /// any undeclared keys are carried through untyped. Keys present in the
    /// document keep its order; keys filled in from the schema follow. `null`
    /// is treated as an empty mapping.
    pub fn resolve_schema(&self, raw: &Json, schema: &Schema) -> Result<ConfigMap, ConfigError> {
        let empty = JsonMap::new();
        let entries = match raw {
            Json::Object(entries) => entries,
            Json::Null => &empty,
            other => {
                return Err(ConfigError::type_mismatch(
                    schema.name(),
                    format!("expected a mapping, found {}", json_kind(other)),
                )
                .within_schema(schema.name()))
            }
        };

        self.resolve_fields(entries, schema)
            .map_err(|err| err.within_schema(schema.name()))
    }

    fn resolve_fields(
        &self,
        entries: &JsonMap<String, Json>,
        schema: &Schema,
    ) -> Result<ConfigMap, ConfigError> {
        let mut resolved: IndexMap<&str, Value> = IndexMap::new();

        for field in schema.fields() {
            if let Some(shape) = field.shape() {
                let value = self.resolve_field(field, shape, entries.get(field.key()))?;
                resolved.insert(field.key(), value);
            }
        }

        for field in schema.fields().iter().filter(|f| f.shape().is_none()) {
            if entries.contains_key(field.key()) || resolved.contains_key(field.key()) {
                continue;
            }
            if let Some(default) = field.default() {
                let value = self
                    .resolve_default(default, None)
                    .map_err(|err| err.within_field(field.key()))?;
                resolved.insert(field.key(), value);
            }
        }

        let out = ConfigMap::new();
        for (key, raw) in entries {
            let value = resolved
                .shift_remove(key.as_str())
                .unwrap_or_else(|| materialize(raw));
            out.insert_silent(key.clone(), value);
        }
        for (key, value) in resolved {
            out.insert_silent(key.to_string(), value);
        }

        Ok(out)
    }

    fn resolve_field(
        &self,
        field: &Field,
        shape: &Shape,
        raw: Option<&Json>,
    ) -> Result<Value, ConfigError> {
        let key = field.key();

        if let Shape::Override(binding) = shape {
            return self
                .resolve_override(binding, raw, field.default())
                .map_err(|err| err.within_field(key))?
                .ok_or_else(|| ConfigError::missing_field(key, shape.to_string()));
        }

        match (raw, field.default()) {
            (Some(raw), _) => self.resolve(raw, shape),
            (None, Some(default)) => self.resolve_default(default, Some(shape)),
            (None, None) => match shape {
                Shape::Nested(schema) => self.resolve_schema(&Json::Null, schema).map(Value::Map),
                _ => return Err(ConfigError::missing_field(key, shape.to_string())),
            },
        }
        .map_err(|err| err.within_field(key))
    }

    fn resolve_default(
        &self,
        default: &DefaultValue,
        shape: Option<&Shape>,
    ) -> Result<Value, ConfigError> {
        match default {
            DefaultValue::Nested(schema) => {
                self.resolve_schema(&Json::Null, schema).map(Value::Map)
            }
            DefaultValue::Literal(_) | DefaultValue::Producer(_) => {
                let raw = default.evaluate().unwrap_or(Json::Null);
                match shape {
                    Some(shape) => self.resolve(&raw, shape),
                    None => Ok(materialize(&raw)),
                }
            }
        }
    }

    /// Command line, then file value, then default. `None` when all are absent
    /// and the binding is not a switch.
    fn resolve_override(
        &self,
        binding: &CommandOverride,
        raw: Option<&Json>,
        field_default: Option<&DefaultValue>,
    ) -> Result<Option<Value>, ConfigError> {
        if let Some(value) = binding.lookup(&self.args)? {
            return Ok(Some(value));
        }
        if let Some(raw) = raw {
            return binding.format(raw).map(Some);
        }
        match binding.default().or(field_default) {
            Some(DefaultValue::Nested(schema)) => self
                .resolve_schema(&Json::Null, schema)
                .map(|map| Some(Value::Map(map))),
            Some(default) => {
                let raw = default.evaluate().unwrap_or(Json::Null);
                binding.format(&raw).map(Some)
            }
            None if binding.is_switch() => Ok(Some(Value::Bool(false))),
            None => Ok(None),
        }
    }

    fn resolve_list(&self, raw: &Json, item: &Shape, shape: &Shape) -> Result<Value, ConfigError> {
        let Json::Array(items) = raw else {
            return Err(ConfigError::type_mismatch(
                shape.to_string(),
                format!("expected a sequence, found {}", json_kind(raw)),
            ));
        };
        let list = ConfigList::new();
        for (index, element) in items.iter().enumerate() {
            let value = self
                .resolve(element, item)
                .map_err(|err| err.within_field(&index.to_string()))?;
            list.push_silent(value);
        }
        Ok(Value::List(list))
    }

    fn resolve_map(
        &self,
        raw: &Json,
        key_kind: Primitive,
        value_shape: &Shape,
        shape: &Shape,
    ) -> Result<Value, ConfigError> {
        let Json::Object(entries) = raw else {
            return Err(ConfigError::type_mismatch(
                shape.to_string(),
                format!("expected a mapping, found {}", json_kind(raw)),
            ));
        };
        let map = ConfigMap::new();
        for (key, element) in entries {
            let coerced = key_kind
                .coerce_key(key)
                .map_err(|err| err.within_field(key))?;
            let value = self
                .resolve(element, value_shape)
                .map_err(|err| err.within_field(key))?;
            map.insert_silent(coerced, value);
        }
        Ok(Value::Map(map))
    }

    fn resolve_union(&self, raw: &Json, union: &Union, shape: &Shape) -> Result<Value, ConfigError> {
        if let Some(alternative) = union.alternatives().iter().find(|alt| alt.accepts(raw)) {
            return self.resolve(raw, alternative);
        }
        match union.fallback() {
            Some(fallback) => self.resolve(raw, fallback),
            None => Err(ConfigError::type_mismatch(
                shape.to_string(),
                format!("no alternative accepts a {}", json_kind(raw)),
            )),
        }
    }
}
