//! Flag declarations and their per-parse bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use tf_core::{Error, Result};
use tf_script::{State, Value};

use crate::parse::{parse_bool, parse_duration};

/// How a flag's text value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagKind {
    /// Inferred from the binding, then the default. With neither, the raw
    /// string is stored.
    #[default]
    Auto,
    Str,
    Bool,
    Int,
    Float,
    Duration,
}

impl FlagKind {
    /// Whether a bare `-name` consumes the following token as its value.
    pub fn takes_value(self) -> bool {
        self != FlagKind::Bool
    }

    fn of_value(v: &Value) -> FlagKind {
        match v {
            Value::Str(_) => FlagKind::Str,
            Value::Bool(_) => FlagKind::Bool,
            Value::Int(_) => FlagKind::Int,
            Value::Float(_) => FlagKind::Float,
            Value::Duration(_) => FlagKind::Duration,
            _ => FlagKind::Auto,
        }
    }

    fn parse(self, raw: &str) -> std::result::Result<Value, String> {
        match self {
            FlagKind::Auto | FlagKind::Str => Ok(Value::from(raw)),
            FlagKind::Bool if raw.is_empty() => Ok(Value::Bool(true)),
            FlagKind::Bool => parse_bool(raw).map(Value::Bool),
            FlagKind::Int => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| e.to_string()),
            FlagKind::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string()),
            FlagKind::Duration => parse_duration(raw).map(Value::Duration),
        }
    }
}

/// A typed memory cell receiving a flag's parsed value alongside the bucket.
#[derive(Debug, Clone)]
pub enum Binding {
    Str(Arc<Mutex<String>>),
    Bool(Arc<Mutex<bool>>),
    Int(Arc<Mutex<i64>>),
    Int32(Arc<Mutex<i32>>),
    Float(Arc<Mutex<f64>>),
    Float32(Arc<Mutex<f32>>),
    Duration(Arc<Mutex<Duration>>),
}

impl Binding {
    pub fn kind(&self) -> FlagKind {
        match self {
            Binding::Str(_) => FlagKind::Str,
            Binding::Bool(_) => FlagKind::Bool,
            Binding::Int(_) | Binding::Int32(_) => FlagKind::Int,
            Binding::Float(_) | Binding::Float32(_) => FlagKind::Float,
            Binding::Duration(_) => FlagKind::Duration,
        }
    }

    /// Check that `value` can be stored without changing the cell.
    fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match (self, value) {
            (Binding::Int32(_), Value::Int(v)) => i32::try_from(*v)
                .map(drop)
                .map_err(|_| format!("{v} out of range")),
            _ if FlagKind::of_value(value) == self.kind() => Ok(()),
            (_, other) => Err(format!("cannot store {} in binding", other.type_name())),
        }
    }

    fn store(&self, value: &Value) -> std::result::Result<(), String> {
        match (self, value) {
            (Binding::Str(cell), Value::Str(v)) => *cell.lock() = v.clone(),
            (Binding::Bool(cell), Value::Bool(v)) => *cell.lock() = *v,
            (Binding::Int(cell), Value::Int(v)) => *cell.lock() = *v,
            (Binding::Int32(cell), Value::Int(v)) => {
                *cell.lock() = i32::try_from(*v).map_err(|_| format!("{v} out of range"))?;
            }
            (Binding::Float(cell), Value::Float(v)) => *cell.lock() = *v,
            (Binding::Float32(cell), Value::Float(v)) => *cell.lock() = *v as f32,
            (Binding::Duration(cell), Value::Duration(v)) => *cell.lock() = *v,
            (_, other) => return Err(format!("cannot store {} in binding", other.type_name())),
        }
        Ok(())
    }
}

macro_rules! binding_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Arc<Mutex<$ty>>> for Binding {
                fn from(cell: Arc<Mutex<$ty>>) -> Self {
                    Binding::$variant(cell)
                }
            }
        )*
    };
}

binding_from! {
    String => Str,
    bool => Bool,
    i64 => Int,
    i32 => Int32,
    f64 => Float,
    f32 => Float32,
    Duration => Duration,
}

/// A flag declaration. Values land in the state bucket under the flag name.
#[derive(Debug, Clone, Default)]
pub struct Flag {
    pub name: String,
    /// Environment variable consulted when the flag is not given explicitly.
    pub env: Option<String>,
    pub usage: String,
    pub binding: Option<Binding>,
    pub default: Option<Value>,
    pub kind: FlagKind,
    /// Absence after parsing is a usage error, even when a default exists.
    pub required: bool,
}

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, var: impl Into<String>) -> Self {
        self.env = Some(var.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn kind(mut self, kind: FlagKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn bind(mut self, binding: impl Into<Binding>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The kind values are parsed as, after inference and validation.
    ///
    /// A default or binding that does not fit the kind is a mistake in the
    /// command tree and reported as [`Error::Config`].
    pub fn resolved_kind(&self) -> Result<FlagKind> {
        let mut kind = self.kind;
        if kind == FlagKind::Auto {
            if let Some(binding) = &self.binding {
                kind = binding.kind();
            } else if let Some(default) = &self.default {
                kind = FlagKind::of_value(default);
            }
        }

        if let Some(default) = &self.default {
            let fits = kind != FlagKind::Auto && FlagKind::of_value(default) == kind;
            if !fits {
                return Err(Error::config(format!(
                    "invalid default flag value {default} ({}) for -{}",
                    default.type_name(),
                    self.name
                )));
            }
        }
        if let Some(binding) = &self.binding {
            if binding.kind() != kind {
                return Err(Error::config(format!(
                    "binding for -{} does not match flag kind {kind:?}",
                    self.name
                )));
            }
            if let Some(default) = &self.default {
                binding.check(default).map_err(|e| {
                    Error::config(format!("invalid default flag value for -{}: {e}", self.name))
                })?;
            }
        }
        Ok(kind)
    }
}

/// Per-parse bookkeeping for one flag.
#[derive(Debug)]
pub(crate) struct FlagStatus<'a> {
    pub(crate) flag: &'a Flag,
    pub(crate) kind: FlagKind,
    pub(crate) used: bool,
    from_env: bool,
}

impl<'a> FlagStatus<'a> {
    pub(crate) fn new(flag: &'a Flag) -> Result<Self> {
        Ok(Self {
            flag,
            kind: flag.resolved_kind()?,
            used: false,
            from_env: false,
        })
    }

    /// Parse `raw` into the bucket and binding.
    ///
    /// An explicit value may replace one sourced from the environment but
    /// not another explicit value.
    pub(crate) fn set(
        &mut self,
        st: &mut State,
        raw: &str,
        from_env: bool,
    ) -> std::result::Result<(), String> {
        let name = &self.flag.name;
        if self.used && !(self.from_env && !from_env) {
            return Err(format!("flag -{name} already declared"));
        }
        let value = self
            .kind
            .parse(raw)
            .map_err(|e| format!("invalid value {raw:?} for flag -{name}: {e}"))?;
        if let Some(binding) = &self.flag.binding {
            binding
                .store(&value)
                .map_err(|e| format!("invalid value {raw:?} for flag -{name}: {e}"))?;
        }
        tracing::trace!(flag = %name, from_env, "flag set");
        st.set(name.as_str(), value);
        self.used = true;
        self.from_env = from_env;
        Ok(())
    }

    /// Store the declared default, if any, in the bucket and binding.
    pub(crate) fn set_default(&self, st: &mut State) -> Result<()> {
        let Some(default) = &self.flag.default else {
            return Ok(());
        };
        if let Some(binding) = &self.flag.binding {
            binding.store(default).map_err(|e| {
                Error::config(format!("invalid default flag value for -{}: {e}", self.flag.name))
            })?;
        }
        st.set(self.flag.name.as_str(), default.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn kind_inferred_from_default() {
        assert_eq!(Flag::new("n").default(3i32).resolved_kind().unwrap(), FlagKind::Int);
        assert_eq!(Flag::new("x").default(1.5f32).resolved_kind().unwrap(), FlagKind::Float);
        assert_eq!(Flag::new("s").resolved_kind().unwrap(), FlagKind::Auto);
    }

    #[test]
    fn kind_inferred_from_binding_first() {
        let cell = Arc::new(Mutex::new(Duration::ZERO));
        let flag = Flag::new("wait").bind(cell);
        assert_eq!(flag.resolved_kind().unwrap(), FlagKind::Duration);
    }

    #[test]
    fn mismatched_default_is_config_error() {
        let flag = Flag::new("n").kind(FlagKind::Int).default("three");
        assert_matches!(flag.resolved_kind(), Err(Error::Config(msg)) if msg.contains("-n"));

        let list = Flag::new("l").default(vec!["a".to_string()]);
        assert_matches!(list.resolved_kind(), Err(Error::Config(_)));
    }

    #[test]
    fn mismatched_binding_is_config_error() {
        let cell = Arc::new(Mutex::new(false));
        let flag = Flag::new("n").default(4i64).bind(cell);
        assert_matches!(flag.resolved_kind(), Err(Error::Config(_)));
    }

    #[test]
    fn set_writes_bucket_and_binding() {
        let cell = Arc::new(Mutex::new(0i32));
        let flag = Flag::new("n").bind(cell.clone());
        let mut fs = FlagStatus::new(&flag).unwrap();
        let mut st = State::new();
        fs.set(&mut st, "42", false).unwrap();
        assert_eq!(st.get("n"), Some(&Value::Int(42)));
        assert_eq!(*cell.lock(), 42);
    }

    #[test]
    fn explicit_overrides_env_but_not_explicit() {
        let flag = Flag::new("f");
        let mut fs = FlagStatus::new(&flag).unwrap();
        let mut st = State::new();
        fs.set(&mut st, "env", true).unwrap();
        fs.set(&mut st, "arg", false).unwrap();
        assert_eq!(st.get("f"), Some(&Value::from("arg")));
        let err = fs.set(&mut st, "again", false).unwrap_err();
        assert_eq!(err, "flag -f already declared");
    }

    #[test]
    fn bad_values_name_the_flag() {
        let flag = Flag::new("n").kind(FlagKind::Int);
        let mut fs = FlagStatus::new(&flag).unwrap();
        let err = fs.set(&mut State::new(), "abc", false).unwrap_err();
        assert!(err.starts_with("invalid value \"abc\" for flag -n"), "{err}");
        assert!(!fs.used);
    }

    #[test]
    fn int32_binding_range_checked() {
        let cell = Arc::new(Mutex::new(0i32));
        let flag = Flag::new("n").bind(cell.clone());
        let mut fs = FlagStatus::new(&flag).unwrap();
        assert!(fs.set(&mut State::new(), "9999999999", false).is_err());
        assert_eq!(*cell.lock(), 0);
    }

    #[test]
    fn int32_binding_rejects_out_of_range_default() {
        let cell = Arc::new(Mutex::new(7i32));
        let flag = Flag::new("n").bind(cell.clone()).default(10_000_000_000i64);
        assert_matches!(
            FlagStatus::new(&flag),
            Err(Error::Config(msg)) if msg.contains("-n") && msg.contains("out of range")
        );
        assert_eq!(*cell.lock(), 7);
    }
}
