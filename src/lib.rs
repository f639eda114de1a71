// Library interface for kitrun
// This allows integration tests and embedding hosts to drive the script pipeline

pub mod backend;
pub mod cli_utils;
pub mod config;
pub mod config_discovery;
pub mod logging;
pub mod script;

// Re-export commonly used types
pub use backend::build_evaluator;
pub use config::KitConfig;
pub use config_discovery::{discover_config, load_config_with_discovery};
pub use script::{EvalError, EvalRequest, Evaluator, ScriptLayout};
