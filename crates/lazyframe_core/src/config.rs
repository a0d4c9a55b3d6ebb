use std::collections::HashMap;
use std::sync::LazyLock;

use lazyframe_error::{LazyError, Result};

pub const DEFAULT_MAX_DEPTH: u64 = 256;

/// Configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Reject an expression id that is used by two different definitions.
    pub verify_definitions: bool,
    /// Maximum nesting of evaluate calls on a single thread.
    pub max_depth: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            verify_definitions: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SessionConfig {
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| LazyError::config(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_string(&self, name: &str) -> Result<String> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| LazyError::config(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| LazyError::config(format!("Missing setting for '{name}'")))?;

        let value = (func.get)(&def_conf);
        (func.set)(&value, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(value: &str, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> String,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_str as _,
            get: S::get_as_string as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<VerifyDefinitions>(&mut map);
    insert_setting::<MaxDepth>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_str(value: &str, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_string(conf: &SessionConfig) -> String;
}

pub struct VerifyDefinitions;

impl SessionSetting for VerifyDefinitions {
    const NAME: &'static str = "verify_definitions";
    const DESCRIPTION: &'static str =
        "Error when one expression id is used by two different definitions.";

    fn set_from_str(value: &str, conf: &mut SessionConfig) -> Result<()> {
        conf.verify_definitions = parse_bool(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &SessionConfig) -> String {
        conf.verify_definitions.to_string()
    }
}

pub struct MaxDepth;

impl SessionSetting for MaxDepth {
    const NAME: &'static str = "max_depth";
    const DESCRIPTION: &'static str = "Maximum nesting depth when evaluating an expression graph.";

    fn set_from_str(value: &str, conf: &mut SessionConfig) -> Result<()> {
        let depth: u64 = value.trim().parse().map_err(|_| {
            LazyError::config(format!("Invalid value for '{}': '{value}'", Self::NAME))
        })?;
        if depth == 0 {
            return Err(LazyError::config("max_depth must be greater than zero"));
        }
        conf.max_depth = depth;
        Ok(())
    }

    fn get_as_string(conf: &SessionConfig) -> String {
        conf.max_depth.to_string()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(LazyError::config(format!(
            "Invalid value for '{name}': '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use lazyframe_error::ErrorKind;

    use super::*;

    #[test]
    fn set_and_get() {
        let mut conf = SessionConfig::default();

        conf.set_from_str("verify_definitions", "off").unwrap();
        conf.set_from_str("max_depth", "64").unwrap();

        assert!(!conf.verify_definitions);
        assert_eq!("false", conf.get_as_string("verify_definitions").unwrap());
        assert_eq!("64", conf.get_as_string("max_depth").unwrap());
    }

    #[test]
    fn reset_single_and_all() {
        let mut conf = SessionConfig::default();
        conf.set_from_str("max_depth", "8").unwrap();
        conf.set_from_str("verify_definitions", "false").unwrap();

        conf.reset("max_depth").unwrap();
        assert_eq!(DEFAULT_MAX_DEPTH, conf.max_depth);
        assert!(!conf.verify_definitions);

        conf.reset_all();
        assert_eq!(SessionConfig::default(), conf);
    }

    #[test]
    fn invalid_settings() {
        let mut conf = SessionConfig::default();

        let err = conf.set_from_str("partitions", "4").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());

        let err = conf.set_from_str("max_depth", "zero").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());

        let err = conf.set_from_str("max_depth", "0").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());

        let err = conf.set_from_str("verify_definitions", "maybe").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
    }

    #[test]
    fn list_settings() {
        let names: Vec<_> = SessionConfig::settings()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(vec!["max_depth", "verify_definitions"], names);
    }
}
