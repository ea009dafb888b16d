//! Configuration loading and types for clickpaste
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/clickpaste/config.toml)
//! 3. Environment variables (CLICKPASTE_*)
//! 4. CLI arguments (highest priority)

use crate::dispatch::PasteOptions;
use crate::error::ClickPasteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# ClickPaste Configuration
#
# Location: ~/.config/clickpaste/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/clickpaste/state),
# a custom path, or "disabled" to turn off. The daemon writes its state
# ("idle", "capturing", "confirming", "typing") to this file.
state_file = "auto"

[paste]
# Delay between keystrokes in milliseconds
# Raise this if characters get dropped on slow VNC or remote consoles
delay_ms = 10

# Injection backend: "native", "cli", or "daemon"
# - native: XTest on the X server (X11, XWayland clients), types any Unicode
# - cli: xdotool or wtype per keystroke (see [cli])
# - daemon: ydotoold socket, works everywhere but US-layout characters only
backend = "native"

# Ask before typing texts longer than this many characters
confirm_threshold = 1000

# Click the chosen window before typing so it has keyboard focus
click_target = true

# Wait after the focus click before the first keystroke (milliseconds)
focus_settle_ms = 100

# Use a named delay profile from [profiles] instead of delay_ms
# profile = "vnc"

[profiles]
# Named keystroke delays in milliseconds
default = 10
vnc = 50
slow_vnc = 100
very_slow = 200

[cli]
# Tool for backend = "cli": "xdotool" (X11) or "wtype" (Wayland)
tool = "xdotool"

[daemon]
# ydotoold socket for backend = "daemon"
# "auto" checks $YDOTOOL_SOCKET, then $XDG_RUNTIME_DIR/.ydotool_socket,
# then /tmp/.ydotool_socket
socket = "auto"

[hotkey]
# Built-in hotkey detection via evdev (requires the 'input' group)
# Leave disabled when binding `clickpaste trigger` in your compositor
enabled = false

# Key that starts a paste (evdev KEY_* name without the prefix)
key = "V"

# Modifier keys that must be held with it
modifiers = ["LEFTCTRL", "LEFTALT"]

# Key that cancels a paste in progress (empty to disable)
cancel_key = "ESC"

[notification]
# Desktop notifications for paste outcomes (notify-send)
enabled = true
"#;

/// Injection backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// XTest on the X server
    #[default]
    Native,
    /// External CLI tool
    Cli,
    /// ydotoold socket
    Daemon,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" | "xtest" => Ok(BackendKind::Native),
            "cli" | "xdotool" | "wtype" => Ok(BackendKind::Cli),
            "daemon" | "ydotool" | "ydotoold" => Ok(BackendKind::Daemon),
            other => Err(format!(
                "unknown backend '{}' (expected native, cli or daemon)",
                other
            )),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Cli => write!(f, "cli"),
            BackendKind::Daemon => write!(f, "daemon"),
        }
    }
}

/// Tool used by the CLI backend
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CliTool {
    #[default]
    Xdotool,
    Wtype,
}

impl CliTool {
    /// Executable name
    pub fn program(&self) -> &'static str {
        match self {
            CliTool::Xdotool => "xdotool",
            CliTool::Wtype => "wtype",
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Optional path to state file for external integrations (e.g., Waybar)
    /// Example: "/run/user/1000/clickpaste/state" or use "auto" for default location
    #[serde(default = "default_state_file")]
    pub state_file: Option<String>,

    #[serde(default)]
    pub paste: PasteConfig,

    /// Named delay profiles (name → delay in ms)
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, u32>,

    #[serde(default)]
    pub cli: CliConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Paste behavior
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PasteConfig {
    /// Delay between keystrokes in milliseconds
    pub delay_ms: u32,

    pub backend: BackendKind,

    /// Ask before typing more characters than this
    pub confirm_threshold: usize,

    /// Click the target before typing
    pub click_target: bool,

    /// Wait after the focus click in milliseconds
    pub focus_settle_ms: u32,

    /// Named profile overriding delay_ms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10,
            backend: BackendKind::Native,
            confirm_threshold: 1000,
            click_target: true,
            focus_settle_ms: 100,
            profile: None,
        }
    }
}

/// CLI backend configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default)]
    pub tool: CliTool,
}

/// Daemon backend configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Socket path or "auto"
    #[serde(default = "default_auto")]
    pub socket: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: default_auto(),
        }
    }
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HotkeyConfig {
    /// Enable built-in hotkey detection (default: false)
    /// Most users bind `clickpaste trigger` in their compositor instead
    #[serde(default)]
    pub enabled: bool,

    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Modifier keys that must also be held
    /// Examples: ["LEFTCTRL"], ["LEFTALT", "LEFTSHIFT"]
    #[serde(default = "default_hotkey_modifiers")]
    pub modifiers: Vec<String>,

    /// Key that cancels a running paste; empty disables it
    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: default_hotkey_key(),
            modifiers: default_hotkey_modifiers(),
            cancel_key: default_cancel_key(),
        }
    }
}

/// Desktop notification configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Notify on paste completion, cancellation and failure
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_state_file() -> Option<String> {
    Some(default_auto())
}

fn default_hotkey_key() -> String {
    "V".to_string()
}

fn default_hotkey_modifiers() -> Vec<String> {
    vec!["LEFTCTRL".to_string(), "LEFTALT".to_string()]
}

fn default_cancel_key() -> String {
    "ESC".to_string()
}

fn default_profiles() -> BTreeMap<String, u32> {
    [("default", 10), ("vnc", 50), ("slow_vnc", 100), ("very_slow", 200)]
        .into_iter()
        .map(|(name, ms)| (name.to_string(), ms))
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            paste: PasteConfig::default(),
            profiles: default_profiles(),
            cli: CliConfig::default(),
            daemon: DaemonConfig::default(),
            hotkey: HotkeyConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "clickpaste")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the runtime directory for ephemeral files (state, pid, lock)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("clickpaste")
    }

    /// PID file used by `trigger` and `cancel` to find the daemon
    pub fn pid_file() -> PathBuf {
        Self::runtime_dir().join("pid")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Configured ydotoold socket, or None for automatic lookup
    pub fn resolve_daemon_socket(&self) -> Option<PathBuf> {
        match self.daemon.socket.trim() {
            "" | "auto" => None,
            path => Some(PathBuf::from(path)),
        }
    }

    /// Keystroke delay after applying the selected profile
    pub fn effective_delay_ms(&self) -> Result<u32, ClickPasteError> {
        match &self.paste.profile {
            None => Ok(self.paste.delay_ms),
            Some(name) => self.profiles.get(name).copied().ok_or_else(|| {
                let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
                ClickPasteError::Config(format!(
                    "Unknown delay profile '{}'. Known profiles: {}",
                    name,
                    known.join(", ")
                ))
            }),
        }
    }

    /// Session options for the dispatcher
    pub fn paste_options(&self) -> Result<PasteOptions, ClickPasteError> {
        Ok(PasteOptions {
            delay: Duration::from_millis(self.effective_delay_ms()? as u64),
            confirm_threshold: self.paste.confirm_threshold,
            click_target: self.paste.click_target,
            focus_settle: Duration::from_millis(self.paste.focus_settle_ms as u64),
        })
    }

    /// Apply CLICKPASTE_* overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ClickPasteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("CLICKPASTE_BACKEND") {
            self.paste.backend = backend.parse().map_err(ClickPasteError::Config)?;
        }
        if let Some(delay) = lookup("CLICKPASTE_DELAY_MS") {
            self.paste.delay_ms = delay.trim().parse().map_err(|_| {
                ClickPasteError::Config(format!("CLICKPASTE_DELAY_MS is not a number: '{}'", delay))
            })?;
            // An explicit delay wins over a profile from the file
            self.paste.profile = None;
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, ClickPasteError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ClickPasteError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| ClickPasteError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    config.apply_env(|key| std::env::var(key).ok())?;

    Ok(config)
}

/// Write the commented default configuration to `path`
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ClickPasteError> {
    if path.exists() && !force {
        return Err(ClickPasteError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ClickPasteError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| ClickPasteError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.paste.delay_ms, 10);
        assert_eq!(config.paste.backend, BackendKind::Native);
        assert_eq!(config.paste.confirm_threshold, 1000);
        assert!(config.paste.click_target);
        assert!(!config.hotkey.enabled);
        assert_eq!(config.hotkey.key, "V");
        assert_eq!(config.profiles.get("vnc"), Some(&50));
        assert!(config.notification.enabled);
    }

    #[test]
    fn test_default_config_text_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.paste, defaults.paste);
        assert_eq!(parsed.profiles, defaults.profiles);
        assert_eq!(parsed.cli, defaults.cli);
        assert_eq!(parsed.daemon, defaults.daemon);
        assert_eq!(parsed.hotkey, defaults.hotkey);
        assert_eq!(parsed.notification, defaults.notification);
        assert_eq!(parsed.state_file, defaults.state_file);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [paste]
            backend = "daemon"
            delay_ms = 25

            [daemon]
            socket = "/run/ydotoold/socket"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.paste.backend, BackendKind::Daemon);
        assert_eq!(config.paste.delay_ms, 25);
        assert_eq!(config.paste.confirm_threshold, 1000); // default
        assert_eq!(
            config.resolve_daemon_socket(),
            Some(PathBuf::from("/run/ydotoold/socket"))
        );
        assert_eq!(config.cli.tool, CliTool::Xdotool);
        assert_eq!(config.profiles.len(), 4);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.paste, PasteConfig::default());
        assert_eq!(config.resolve_daemon_socket(), None);
    }

    #[test]
    fn test_profile_overrides_delay() {
        let mut config = Config::default();
        config.paste.profile = Some("slow_vnc".to_string());
        assert_eq!(config.effective_delay_ms().unwrap(), 100);
        assert_eq!(
            config.paste_options().unwrap().delay,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_unknown_profile_is_an_error() {
        let mut config = Config::default();
        config.paste.profile = Some("glacial".to_string());
        let err = config.effective_delay_ms().unwrap_err().to_string();
        assert!(err.contains("glacial"));
        assert!(err.contains("very_slow"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("CLICKPASTE_BACKEND", "cli"), ("CLICKPASTE_DELAY_MS", "75")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config.paste.profile = Some("vnc".to_string());

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.paste.backend, BackendKind::Cli);
        assert_eq!(config.effective_delay_ms().unwrap(), 75);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|key| (key == "CLICKPASTE_BACKEND").then(|| "carrier-pigeon".to_string()))
            .is_err());
        assert!(config
            .apply_env(|key| (key == "CLICKPASTE_DELAY_MS").then(|| "fast".to_string()))
            .is_err());
    }

    #[test]
    fn test_state_file_resolution() {
        let mut config = Config::default();
        assert!(config.resolve_state_file().unwrap().ends_with("clickpaste/state"));
        config.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());
        config.state_file = Some("/tmp/cp-state".to_string());
        assert_eq!(config.resolve_state_file(), Some(PathBuf::from("/tmp/cp-state")));
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/config.toml");
        write_default_config(&path, false).unwrap();
        assert!(write_default_config(&path, false).is_err());
        write_default_config(&path, true).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.paste.delay_ms, 10);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("XTEST".parse::<BackendKind>(), Ok(BackendKind::Native));
        assert_eq!("ydotool".parse::<BackendKind>(), Ok(BackendKind::Daemon));
        assert!("nope".parse::<BackendKind>().is_err());
    }
}
