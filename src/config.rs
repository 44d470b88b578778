use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "medscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medscan=info,lopdf=warn,pdf_extract=error"
}

/// Get the application config directory (`~/.config/medscan` on Linux).
/// `None` when the platform has no config directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Default location of the pipeline config file.
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_under_app_dir() {
        if let (Some(dir), Some(file)) = (config_dir(), config_file_path()) {
            assert!(dir.ends_with(APP_NAME));
            assert!(file.starts_with(&dir));
            assert!(file.ends_with("config.json"));
        }
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().starts_with("medscan="));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
