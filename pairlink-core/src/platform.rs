//! Platform-specific utilities for cross-platform support

use std::path::PathBuf;

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\Pairlink
/// - macOS: ~/Library/Application Support/Pairlink
/// - Linux/Other: ~/.config/Pairlink
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("Pairlink")
}

/// Get the default pairing config path
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("pairlink.toml")
}

/// Get the default local account file path
pub fn get_default_account_path() -> PathBuf {
    get_config_dir().join("account.json")
}

/// Ensure the config directory exists, creating it if necessary
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = get_config_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Device type reported to the account service for this build target.
pub fn current_device_type() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "ios") {
        "ios"
    } else if cfg!(target_os = "android") {
        "android"
    } else {
        "linux"
    }
}

/// Best-effort human-readable name for this device.
pub fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("{} device", current_device_type()))
}
