use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sequencer::Platform;
use crate::state::window::WindowProperty;

/// Process-wide settings for browser windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserWindowConfig {
    /// Global popup switch. When off every popup request is rejected.
    pub enable_window_popup: bool,
    /// F12 opens DevTools.
    pub enable_dev_tools: bool,
    /// How many popup windows may be alive at once.
    pub popup_pool_size: usize,
    /// Close model override. Defaults to the compile target's model.
    pub platform: Option<Platform>,
    pub default_url: Option<String>,
    /// Starting property for new main windows.
    pub window: WindowProperty,
}

impl Default for BrowserWindowConfig {
    fn default() -> Self {
        Self {
            enable_window_popup: true,
            enable_dev_tools: true,
            popup_pool_size: 1,
            platform: None,
            default_url: None,
            window: WindowProperty::default(),
        }
    }
}

impl BrowserWindowConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_object_gives_defaults() {
        let config = BrowserWindowConfig::from_json("{}").unwrap();
        assert_eq!(config, BrowserWindowConfig::default());
        assert_eq!(config.platform(), Platform::current());
    }

    #[test]
    fn camel_case_fields_are_read() {
        let config = BrowserWindowConfig::from_json(
            r#"{
                "enableWindowPopup": false,
                "popupPoolSize": 3,
                "platform": "immediateClose",
                "window": { "title": "demo", "width": 800, "isShowModal": true }
            }"#,
        )
        .unwrap();
        assert!(!config.enable_window_popup);
        assert!(config.enable_dev_tools);
        assert_eq!(config.popup_pool_size, 3);
        assert_eq!(config.platform(), Platform::ImmediateClose);
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 768);
        assert!(config.window.is_show_modal);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = BrowserWindowConfig::from_json("{ popupPoolSize: }").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = BrowserWindowConfig::load("/nonexistent/browser-window.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
