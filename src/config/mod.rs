//! Configuration module for the audiobook converter.
//!
//! `AppConfig` is read from `settings.toml` in [`config_dir`]; per-job files
//! (progress record, work dirs) live under the chosen output directory.

pub mod paths;
pub mod settings;

pub use paths::{
    config_dir, progress_file, settings_file, work_dir, CONFIG_DIR_ENV, PROGRESS_FILE_NAME,
    WORK_DIR_NAME,
};
pub use settings::{
    AppConfig, AssemblyConfig, ChunkingConfig, CommandEngineConfig, EngineKind, EventsConfig,
    HttpEngineConfig, LoggingConfig, SynthesisConfig,
};
