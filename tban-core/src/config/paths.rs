//! Default path resolution for configuration and lock files
//!
//! Uses XDG Base Directory specification when available, with sensible fallbacks.

use std::path::PathBuf;

/// Serial device opened when nothing else is configured
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Lock file shared by every tool talking to the controller
pub const DEFAULT_LOCK_FILE: &str = "/tmp/xban.lock";

/// Returns the default path for the configuration file.
///
/// Uses XDG config directory if available:
/// - Linux/macOS: `~/.config/tban/config.toml`
/// - Fallback: `/etc/tban/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("tban")
        .join("config.toml")
}

/// Returns the default lock file path.
pub fn default_lock_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        assert!(path.ends_with("tban/config.toml"));
    }

    #[test]
    fn test_default_lock_path() {
        assert_eq!(default_lock_path(), PathBuf::from("/tmp/xban.lock"));
    }
}
