use std::{fs, path::Path};

use error_stack::{Result, ResultExt};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "nwt.derh.wdh318efw1";
pub const SUPPORTED_MODEL_PREFIX: &str = "nwt.derh";
const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Device,
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntryData {
    pub flow_type: FlowType,
    pub host: String,
    pub token: String,
    pub model: String,
    pub mac: Option<String>,
}

/// A configured dehumidifier, as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub title: String,
    pub unique_id: String,
    pub data: ConfigEntryData,
}

/// What the user provides when adding a device.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub host: String,
    pub token: String,
    pub model: Option<String>,
    pub mac: Option<String>,
    pub name: Option<String>,
}

impl ConfigEntry {
    /// Validate user input and create the entry for a supported dehumidifier.
    pub fn from_user_input(input: UserInput) -> Result<ConfigEntry, ConfigError> {
        let host = input.host.trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::MissingHost.into());
        }

        let token = input.token.trim().to_lowercase();
        if !is_valid_token(&token) {
            return Err(ConfigError::InvalidToken.into());
        }

        let model = input
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if !model.starts_with(SUPPORTED_MODEL_PREFIX) {
            return Err(ConfigError::UnsupportedModel(model).into());
        }

        let mac = input.mac.as_deref().map(format_mac).transpose()?;
        let unique_id = mac.clone().unwrap_or_else(|| host.clone());
        let title = input.name.unwrap_or_else(|| model.clone());

        Ok(ConfigEntry {
            title,
            unique_id,
            data: ConfigEntryData {
                flow_type: FlowType::Device,
                host,
                token,
                model,
                mac,
            },
        })
    }

    pub fn load(path: &Path) -> Result<ConfigEntry, ConfigError> {
        let into_context = || format!("Loading config entry from {}", path.display());
        let text = fs::read_to_string(path)
            .map_err(ConfigError::Io)
            .attach_printable_lazy(into_context)?;
        let entry: ConfigEntry = serde_json::from_str(&text)
            .map_err(ConfigError::Json)
            .attach_printable_lazy(into_context)?;

        // Run stored data through the same checks as new input.
        let validated = ConfigEntry::from_user_input(UserInput {
            host: entry.data.host.clone(),
            token: entry.data.token.clone(),
            model: Some(entry.data.model.clone()),
            mac: entry.data.mac.clone(),
            name: Some(entry.title.clone()),
        })
        .attach_printable_lazy(into_context)?;

        Ok(ConfigEntry {
            data: ConfigEntryData {
                flow_type: entry.data.flow_type,
                ..validated.data
            },
            ..entry
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(ConfigError::Json)?;
        fs::write(path, text)
            .map_err(ConfigError::Io)
            .attach_printable_lazy(|| format!("Saving config entry to {}", path.display()))?;
        info!("Config entry {} saved to {}", self.unique_id, path.display());
        Ok(())
    }
}

fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalise a MAC address to lower case, colon separated form.
pub fn format_mac(mac: &str) -> Result<String, ConfigError> {
    let digits: String = mac
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidMac(mac.to_string()).into());
    }

    let digits = digits.to_lowercase();
    Ok((0..6)
        .map(|i| &digits[i * 2..i * 2 + 2])
        .collect::<Vec<_>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    use super::{format_mac, ConfigEntry, FlowType, UserInput, DEFAULT_MODEL};
    use crate::error::ConfigError;

    const TOKEN: &str = "38448b7d0c8e8b3fff3014df344bd11f";

    fn input() -> UserInput {
        UserInput {
            host: "192.168.100.47".to_string(),
            token: TOKEN.to_string(),
            model: None,
            mac: Some("40:31:3C:37:4D:27".to_string()),
            name: None,
        }
    }

    #[test]
    fn test_user_input_creates_device_entry() {
        let entry = ConfigEntry::from_user_input(input()).unwrap();
        assert_eq!(entry.data.flow_type, FlowType::Device);
        assert_eq!(entry.data.model, DEFAULT_MODEL);
        assert_eq!(entry.unique_id, "40:31:3c:37:4d:27");
        assert_eq!(entry.title, DEFAULT_MODEL);
    }

    #[test]
    fn test_unique_id_falls_back_to_host() {
        let entry = ConfigEntry::from_user_input(UserInput { mac: None, ..input() }).unwrap();
        assert_eq!(entry.unique_id, "192.168.100.47");
    }

    #[test]
    fn test_invalid_input_rejected() {
        let error = ConfigEntry::from_user_input(UserInput { host: " ".to_string(), ..input() }).unwrap_err();
        assert!(matches!(error.current_context(), ConfigError::MissingHost));

        let error = ConfigEntry::from_user_input(UserInput { token: "1234".to_string(), ..input() }).unwrap_err();
        assert!(matches!(error.current_context(), ConfigError::InvalidToken));

        let error = ConfigEntry::from_user_input(UserInput {
            model: Some("zhimi.humidifier.v1".to_string()),
            ..input()
        })
        .unwrap_err();
        assert!(matches!(error.current_context(), ConfigError::UnsupportedModel(_)));

        let error = ConfigEntry::from_user_input(UserInput { mac: Some("40:31:3C".to_string()), ..input() }).unwrap_err();
        assert!(matches!(error.current_context(), ConfigError::InvalidMac(_)));
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac("40-31-3C-37-4D-27").unwrap(), "40:31:3c:37:4d:27");
        assert_eq!(format_mac("40313c374d27").unwrap(), "40:31:3c:37:4d:27");
        assert!(format_mac("40313c374d2g").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");

        let entry = ConfigEntry::from_user_input(UserInput {
            name: Some("Basement".to_string()),
            ..input()
        })
        .unwrap();
        entry.save(&path).unwrap();

        let loaded = ConfigEntry::load(&path).unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_load_rejects_bad_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        std::fs::write(
            &path,
            r#"{"title":"x","unique_id":"y","data":{"flow_type":"device","host":"10.0.0.2","token":"nope","model":"nwt.derh.wdh318efw1","mac":null}}"#,
        )
        .unwrap();

        let error = ConfigEntry::load(&path).unwrap_err();
        assert!(matches!(error.current_context(), ConfigError::InvalidToken));
    }
}
