mod engine;
mod logging;

pub use engine::EngineConfig;
pub use logging::{LogFormat, LoggingConfig};
