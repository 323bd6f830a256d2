//! Session configuration.

use serde::{Deserialize, Serialize};

fn default_service_name() -> String {
    "huddle".to_string()
}

fn default_display_name() -> String {
    "huddle-device".to_string()
}

fn default_buffer() -> usize {
    64
}

/// Configuration for a huddle session.
///
/// Every field has a default, so an empty TOML file (or no file at all)
/// yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name this device advertises to nearby peers.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Logical service identifier the transport advertises under.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Capacity of the network → presentation event channel.
    #[serde(default = "default_buffer")]
    pub event_buffer: usize,
    /// Capacity of the presentation → network command channel.
    #[serde(default = "default_buffer")]
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            service_name: default_service_name(),
            event_buffer: default_buffer(),
            command_buffer: default_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.service_name, "huddle");
        assert_eq!(config.event_buffer, 64);
        assert_eq!(config.command_buffer, 64);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SessionConfig = toml::from_str(r#"display_name = "attic-pi""#).unwrap();
        assert_eq!(config.display_name, "attic-pi");
        assert_eq!(config.service_name, "huddle");
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config.display_name, "huddle-device");
    }
}
