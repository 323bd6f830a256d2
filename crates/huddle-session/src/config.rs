//! Configuration loading from a TOML file, with defaults.

use huddle_types::SessionConfig;
use std::path::Path;
use tracing::{info, warn};

/// Load session configuration from a TOML file.
///
/// A missing file or a file that fails to parse falls back to
/// [`SessionConfig::default`] with a logged warning; configuration
/// problems never stop a session from starting.
pub fn load_config(path: Option<&Path>) -> SessionConfig {
    let Some(path) = path else {
        return SessionConfig::default();
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<SessionConfig>(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to parse config, using defaults"
                );
                SessionConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %path.display(),
                "Failed to read config file, using defaults"
            );
            SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load_config(Some(Path::new("/no/such/huddle.toml")));
        assert_eq!(config.display_name, "huddle-device");
    }

    #[test]
    fn test_load_no_path_uses_defaults() {
        let config = load_config(None);
        assert_eq!(config.service_name, "huddle");
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "display_name = \"attic-pi\"").unwrap();
        writeln!(file, "event_buffer = 128").unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.display_name, "attic-pi");
        assert_eq!(config.event_buffer, 128);
        assert_eq!(config.service_name, "huddle");
    }

    #[test]
    fn test_load_garbage_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not even = [ toml").unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.display_name, "huddle-device");
    }
}
