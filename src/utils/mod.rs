pub mod config;
pub mod logger;
pub(crate) mod parbatch_toml;

pub use config::*;
pub use logger::setup_logging;
