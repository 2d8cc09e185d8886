//! Command-line overrides for individual schema fields.
//!
//! A [`CommandOverride`] binds a field to a flag named `<prefix><key>`, with
//! an optional short alias `<prefix><first letter of key>`. During
//! resolution the command line wins over the file, and the file wins over
//! the declared default.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::node::{materialize, Value};
use crate::schema::{DefaultValue, Primitive};
use crate::ConfigError;

/// How the flag's argument is interpreted.
#[derive(Clone)]
pub enum OverrideKind {
    /// Coerced with the primitive table. `Boolean` flags take no argument.
    Primitive(Primitive),
    /// Presence-only switch: `true` when given.
    Flag,
    /// A custom one-argument coercion.
    Custom(Arc<dyn Fn(&Json) -> Result<Json, String> + Send + Sync>),
}

impl OverrideKind {
    /// A custom coercion function.
    pub fn custom(f: impl Fn(&Json) -> Result<Json, String> + Send + Sync + 'static) -> Self {
        OverrideKind::Custom(Arc::new(f))
    }

    fn takes_argument(&self) -> bool {
        !matches!(
            self,
            OverrideKind::Flag | OverrideKind::Primitive(Primitive::Boolean)
        )
    }
}

impl fmt::Debug for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideKind::Primitive(primitive) => write!(f, "Primitive({primitive:?})"),
            OverrideKind::Flag => f.write_str("Flag"),
            OverrideKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<Primitive> for OverrideKind {
    fn from(primitive: Primitive) -> Self {
        OverrideKind::Primitive(primitive)
    }
}

/// Binding between a schema field and a command-line flag.
///
/// # Example
///
/// ```
/// use tessera_config::{CommandOverride, Primitive, Value};
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let port = CommandOverride::new("port")
///     .with_prefix("--")
///     .with_kind(Primitive::Integer);
///
/// let args = vec!["--port".to_string(), "9999".to_string()];
/// assert_eq!(port.lookup(&args)?, Some(Value::Int(9999)));
/// assert_eq!(port.lookup(&[])?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandOverride {
    key: String,
    prefix: String,
    short: bool,
    kind: OverrideKind,
    default: Option<DefaultValue>,
}

impl CommandOverride {
    /// A string-valued override for `-<key>`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: "-".to_string(),
            short: false,
            kind: OverrideKind::Primitive(Primitive::String),
            default: None,
        }
    }

    /// Set the flag prefix (default `-`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Also accept `<prefix><first letter of key>`.
    #[must_use]
    pub fn with_short(mut self) -> Self {
        self.short = true;
        self
    }

    /// Set the expected kind of the argument.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<OverrideKind>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the value used when neither the command line nor the file provides one.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The bound key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The declared kind.
    pub fn kind(&self) -> &OverrideKind {
        &self.kind
    }

    /// The declared default.
    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Returns `true` for presence-only flags.
    pub fn is_switch(&self) -> bool {
        !self.kind.takes_argument()
    }

    /// The long flag, `<prefix><key>`.
    pub fn flag_name(&self) -> String {
        format!("{}{}", self.prefix, self.key)
    }

    /// The short flag, `<prefix><first letter>`, when enabled.
    pub fn short_name(&self) -> Option<String> {
        if !self.short {
            return None;
        }
        self.key
            .chars()
            .next()
            .map(|c| format!("{}{c}", self.prefix))
    }

    /// Scan `args` for the flag.
    ///
    /// Switches yield `true` without consuming a token; other kinds consume
    /// the following token and coerce it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingArgument`] if an argument-taking flag is
    /// the last token, or a schema error if the argument fails coercion.
    pub fn lookup(&self, args: &[String]) -> Result<Option<Value>, ConfigError> {
        let long = self.flag_name();
        let short = self.short_name();
        let Some(position) = args
            .iter()
            .position(|arg| *arg == long || short.as_ref() == Some(arg))
        else {
            return Ok(None);
        };

        if !self.kind.takes_argument() {
            return Ok(Some(Value::Bool(true)));
        }
        match args.get(position + 1) {
            Some(token) => {
                tracing::debug!(flag = %args[position], "Applying command-line override");
                self.format(&Json::String(token.clone())).map(Some)
            }
            None => Err(ConfigError::missing_argument(&args[position])),
        }
    }

    /// Coerce a file-provided or default value to the declared kind.
    pub fn format(&self, raw: &Json) -> Result<Value, ConfigError> {
        match &self.kind {
            OverrideKind::Primitive(primitive) => primitive.coerce(raw),
            OverrideKind::Flag => Primitive::Boolean.coerce(raw),
            OverrideKind::Custom(convert) => convert(raw)
                .map(|value| materialize(&value))
                .map_err(|reason| ConfigError::type_mismatch(self.to_string(), reason)),
        }
    }
}

impl fmt::Display for CommandOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OverrideKind::Primitive(primitive) => {
                write!(f, "{} ({primitive})", self.flag_name())
            }
            OverrideKind::Flag => write!(f, "{} (flag)", self.flag_name()),
            OverrideKind::Custom(_) => write!(f, "{} (custom)", self.flag_name()),
        }
    }
}
