//! Where settings and per-job files live.
//!
//! Layout:
//!
//! Config dir (settings, overridable with `$AUDIOBOOK_CONVERTER_CONFIG_DIR`):
//!   Windows: %APPDATA%\audiobook-converter\
//!   macOS:   ~/Library/Application Support/audiobook-converter/
//!   Linux:   ~/.config/audiobook-converter/
//!
//! Per-job files live next to the chosen output directory, not here:
//!
//! ```text
//! <output_dir>/.conversion_progress.json      progress record (0600)
//! <output_dir>/.work/<fingerprint16>/          chunk artifacts (0700)
//! ```

use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "audiobook-converter";

/// Overrides [`config_dir`] when set.
pub const CONFIG_DIR_ENV: &str = "AUDIOBOOK_CONVERTER_CONFIG_DIR";

/// Directory holding `settings.toml`.
///
/// `$AUDIOBOOK_CONVERTER_CONFIG_DIR` wins; otherwise the platform config
/// dir, or the current directory when the platform has none.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default location of the settings file.
pub fn settings_file() -> PathBuf {
    config_dir().join("settings.toml")
}

/// File name of the per-output-directory progress record.
pub const PROGRESS_FILE_NAME: &str = ".conversion_progress.json";

/// Directory (under the output directory) holding per-job working dirs.
pub const WORK_DIR_NAME: &str = ".work";

/// Path of the progress record for `output_dir`.
pub fn progress_file(output_dir: &Path) -> PathBuf {
    output_dir.join(PROGRESS_FILE_NAME)
}

/// Private working directory for the job identified by `fingerprint_hex`.
///
/// Only the first 16 hex digits are used so paths stay short.
pub fn work_dir(output_dir: &Path, fingerprint_hex: &str) -> PathBuf {
    let short: String = fingerprint_hex.chars().take(16).collect();
    output_dir.join(WORK_DIR_NAME).join(short)
}
