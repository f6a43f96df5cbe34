use crate::domain::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 27123;
pub const MIN_PORT: u16 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "mbbridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default)]
    pub auth_token: Option<String>,

    // Radio
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,

    // Diagnostics
    #[serde(default = "default_false")]
    pub protocol_log_enabled: bool,
    #[serde(default = "default_false")]
    pub scan_all_devices: bool,
    #[serde(default)]
    pub scan_address_filter: String,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_port: default_port(),
            auth_token: None,
            ble_service_uuid: default_service_uuid(),
            protocol_log_enabled: false,
            scan_all_devices: false,
            scan_address_filter: String::new(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Configured token, with blank values treated as "no token".
    pub fn token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_service_uuid() -> String {
    "c76393eb-1994-4b4d-b1e2-1d7bde0571fa".to_string()
}

pub fn validate_port(port: u32) -> Result<u16, BridgeError> {
    match u16::try_from(port) {
        Ok(p) if p >= MIN_PORT => Ok(p),
        _ => Err(BridgeError::InvalidPort(port)),
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Loads from `path`, falling back to defaults when missing or invalid.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let mut settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({})", e);
                Settings::default()
            }
        };
        if validate_port(u32::from(settings.server_port)).is_err() {
            settings.server_port = DEFAULT_PORT;
        }

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("MBBridgeController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_port(&mut self, port: u32) -> anyhow::Result<u16> {
        let port = validate_port(port)?;
        self.settings.server_port = port;
        self.save()?;
        Ok(port)
    }

    pub fn set_token(&mut self, token: Option<&str>) -> anyhow::Result<()> {
        self.settings.auth_token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self.save()?;
        tracing::info!(
            "Token {}",
            if self.settings.auth_token.is_some() {
                "updated"
            } else {
                "cleared"
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mbbridge-settings-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir.join("settings.json")
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(27123).unwrap(), 27123);
        assert_eq!(validate_port(1024).unwrap(), 1024);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(matches!(validate_port(1023), Err(BridgeError::InvalidPort(1023))));
        assert!(matches!(validate_port(65536), Err(BridgeError::InvalidPort(65536))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"auth_token":"  "}"#).unwrap();
        assert_eq!(settings.server_port, DEFAULT_PORT);
        assert_eq!(settings.token(), None);
        assert_eq!(settings.ble_service_uuid, "c76393eb-1994-4b4d-b1e2-1d7bde0571fa");
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_persist_port_and_token() {
        let path = temp_settings_path("persist");
        let _ = fs::remove_file(&path);

        let mut service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().server_port, DEFAULT_PORT);
        assert!(service.set_port(80).is_err());
        assert_eq!(service.set_port(28000).unwrap(), 28000);
        service.set_token(Some("  abc ")).unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.get().server_port, 28000);
        assert_eq!(reloaded.get().token(), Some("abc"));

        let mut service = reloaded;
        service.set_token(Some("")).unwrap();
        assert_eq!(SettingsService::with_path(path.clone()).get().token(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_out_of_range_port_on_disk_falls_back() {
        let path = temp_settings_path("range");
        fs::write(&path, r#"{"server_port":80}"#).unwrap();
        let service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().server_port, DEFAULT_PORT);
        let _ = fs::remove_file(&path);
    }
}
