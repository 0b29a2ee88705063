//! Declared tool inputs and validation against them.
//!
//! A [`ToolSchema`] is the single source for both the JSON Schema advertised
//! to clients and the checks run before a handler sees its arguments, so the
//! two cannot drift apart.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Boolean,
    /// Milliseconds since the epoch. Also accepts an RFC 3339 string.
    Timestamp,
}

impl ArgType {
    fn json_type(self) -> Value {
        match self {
            Self::String => json!("string"),
            Self::Integer => json!("integer"),
            Self::Boolean => json!("boolean"),
            Self::Timestamp => json!(["integer", "string"]),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Timestamp => "a millisecond timestamp or RFC 3339 date",
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
    pub description: &'static str,
    pub required: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub default: Option<Value>,
    pub allowed: &'static [&'static str],
}

impl ArgSpec {
    fn new(name: &'static str, ty: ArgType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            description,
            required: false,
            min: None,
            max: None,
            default: None,
            allowed: &[],
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Integer, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Boolean, description)
    }

    pub fn timestamp(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Timestamp, description)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), self.ty.json_type());
        prop.insert("description".into(), json!(self.description));
        if let Some(min) = self.min {
            prop.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.max {
            prop.insert("maximum".into(), json!(max));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        if !self.allowed.is_empty() {
            prop.insert("enum".into(), json!(self.allowed));
        }
        Value::Object(prop)
    }

    /// Check one present value and return it in canonical form.
    fn coerce(&self, value: &Value) -> Result<Value, ValidationError> {
        let mismatch = || ValidationError::Type {
            name: self.name,
            expected: self.ty.expected(),
        };
        match self.ty {
            ArgType::String => {
                let s = match value {
                    Value::String(s) => s.clone(),
                    // Ids such as message timestamps often arrive as numbers.
                    Value::Number(n) => n.to_string(),
                    _ => return Err(mismatch()),
                };
                if !self.allowed.is_empty() && !self.allowed.contains(&s.as_str()) {
                    return Err(ValidationError::NotAllowed {
                        name: self.name,
                        allowed: self.allowed.join(", "),
                    });
                }
                Ok(Value::String(s))
            },
            ArgType::Integer => {
                let n = match value {
                    Value::Number(n) => n.as_i64().ok_or_else(mismatch)?,
                    Value::String(s) => s.trim().parse().map_err(|_| mismatch())?,
                    _ => return Err(mismatch()),
                };
                self.check_range(n)?;
                Ok(json!(n))
            },
            ArgType::Boolean => match value {
                Value::Bool(b) => Ok(json!(b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(json!(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(json!(false)),
                _ => Err(mismatch()),
            },
            ArgType::Timestamp => {
                let ms = match value {
                    Value::Number(n) => n.as_i64().ok_or_else(mismatch)?,
                    Value::String(s) => parse_timestamp(s).ok_or_else(mismatch)?,
                    _ => return Err(mismatch()),
                };
                Ok(json!(ms))
            },
        }
    }

    fn check_range(&self, n: i64) -> Result<(), ValidationError> {
        let below = self.min.is_some_and(|min| n < min);
        let above = self.max.is_some_and(|max| n > max);
        if !(below || above) {
            return Ok(());
        }
        let bound = match (self.min, self.max) {
            (Some(min), Some(max)) => format!("between {min} and {max}"),
            (Some(min), None) => format!("at least {min}"),
            (None, Some(max)) => format!("at most {max}"),
            (None, None) => return Ok(()),
        };
        Err(ValidationError::OutOfRange {
            name: self.name,
            value: n,
            bound,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing required argument: {0}")]
    Missing(&'static str),

    #[error("argument '{name}' must be {expected}")]
    Type {
        name: &'static str,
        expected: &'static str,
    },

    #[error("argument '{name}' is {value}, must be {bound}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        bound: String,
    },

    #[error("argument '{name}' must be one of: {allowed}")]
    NotAllowed { name: &'static str, allowed: String },
}

/// Declared input of one tool.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    args: Vec<ArgSpec>,
}

impl ToolSchema {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// JSON Schema (draft 7 subset) for `tools/list`.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|a| (a.name.to_string(), a.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate raw call arguments.
    ///
    /// `null` and blank strings count as absent. Defaults are filled in,
    /// values are coerced to their canonical type and undeclared keys are
    /// dropped.
    pub fn validate(&self, raw: &Value) -> Result<Args, ValidationError> {
        let empty = Map::new();
        let input = match raw {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => return Err(ValidationError::NotAnObject),
        };

        let mut out = Map::new();
        for spec in &self.args {
            let present = input.get(spec.name).filter(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            });
            match (present, &spec.default) {
                (Some(value), _) => {
                    out.insert(spec.name.to_string(), spec.coerce(value)?);
                },
                (None, _) if spec.required => return Err(ValidationError::Missing(spec.name)),
                (None, Some(default)) => {
                    out.insert(spec.name.to_string(), default.clone());
                },
                (None, None) => {},
            }
        }
        Ok(Args(out))
    }
}

/// Validated arguments, keyed by declared name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// A required string. Validation already guarantees presence; this only
    /// fails if a handler asks for an argument its schema does not require.
    pub fn require_str(&self, name: &str) -> anyhow::Result<&str> {
        self.str(name)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: {name}"))
    }

    /// An integer limit, clamped into `u32`.
    pub fn limit(&self, name: &str, fallback: u32) -> u32 {
        self.int(name)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(fallback)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
