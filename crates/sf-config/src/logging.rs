use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Logging configuration. Every field has a default, so the whole
/// `[logging]` section may be omitted from `stepflow.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
    /// Per-module overrides, e.g. `{ "sf_runtime::driver" = "debug" }`.
    pub modules: HashMap<String, String>,
    /// Optional log file. Relative paths are resolved against the config
    /// file's parent directory.
    pub file: Option<PathBuf>,
    /// Output format: `plain` (human-readable) or `json` (structured).
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Render the level + module overrides as an `EnvFilter` directive
    /// string, e.g. `"info,sf_runtime::driver=debug"`.
    pub fn directives(&self) -> String {
        let mut out = self.level.clone();
        for (module, level) in &self.modules {
            out.push(',');
            out.push_str(module);
            out.push('=');
            out.push_str(level);
        }
        out
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: HashMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}
