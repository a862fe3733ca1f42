use std::path::PathBuf;

use tracing::Level;

pub const PRESET_DIR_ENV: &str = "FM_EXPLORER_PRESET_DIR";
pub const LOG_ENV: &str = "FM_EXPLORER_LOG";

const DEFAULT_PRESET_DIR: &str = "presets";
const DEFAULT_WINDOW_WIDTH: i32 = 1280;
const DEFAULT_WINDOW_HEIGHT: i32 = 800;
const DEFAULT_SCOPE_SIZE: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub preset_dir: PathBuf,
    pub log_level: Level,
    pub window_width: i32,
    pub window_height: i32,
    pub scope_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preset_dir: PathBuf::from(DEFAULT_PRESET_DIR),
            log_level: Level::INFO,
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            scope_size: DEFAULT_SCOPE_SIZE,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Unparseable values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(PRESET_DIR_ENV).filter(|dir| !dir.trim().is_empty()) {
            config.preset_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_ENV) {
            match level.trim().parse::<Level>() {
                Ok(level) => config.log_level = level,
                Err(_) => eprintln!("ignoring {LOG_ENV}={level:?}: not a log level"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.scope_size, 1024);
    }

    #[test]
    fn environment_overrides_dir_and_level() {
        let config = AppConfig::from_lookup(lookup(&[
            (PRESET_DIR_ENV, "/tmp/fm"),
            (LOG_ENV, "debug"),
        ]));
        assert_eq!(config.preset_dir, PathBuf::from("/tmp/fm"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup(&[(PRESET_DIR_ENV, "  "), (LOG_ENV, "loud")]));
        assert_eq!(config, AppConfig::default());
    }
}
