use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::movie::CacheMode;
use crate::reader::registry::FormatTable;
use crate::types::Size;

const SETTINGS_VERSION: u32 = 1;

fn default_speed() -> u32 {
    100
}

/// Playback defaults persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub version: u32,
    /// Percent of normal speed.
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default)]
    pub cache_mode: CacheMode,
    /// RGBA fill for disposed frame areas. Transparent when unset.
    #[serde(default)]
    pub background_color: Option<[u8; 4]>,
    #[serde(default)]
    pub scaled_size: Option<Size>,
    #[serde(default)]
    pub formats: FormatTable,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            speed: default_speed(),
            cache_mode: CacheMode::None,
            background_color: None,
            scaled_size: None,
            formats: FormatTable::default(),
        }
    }
}

impl PlaybackSettings {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flipbook").join("settings.json"))
    }

    /// Load from the user config dir, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings at {}: {e:#}", path.display());
                Self::default()
            }
        }
    }

    /// Best-effort save to the user config dir.
    pub fn save(&self) {
        let Some(path) = Self::path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to save settings: {e:#}");
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        if settings.version > SETTINGS_VERSION {
            anyhow::bail!(
                "settings version {} is newer than supported ({SETTINGS_VERSION})",
                settings.version
            );
        }
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PlaybackSettings {
            speed: 250,
            cache_mode: CacheMode::All,
            background_color: Some([0, 0, 0, 255]),
            scaled_size: Some(Size::new(320, 240)),
            ..PlaybackSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(PlaybackSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let settings: PlaybackSettings = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert_eq!(settings.speed, 100);
        assert_eq!(settings.cache_mode, CacheMode::None);
        assert!(settings.background_color.is_none());
        assert_eq!(settings.formats, FormatTable::default());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"version":99}"#).unwrap();
        assert!(PlaybackSettings::load_from(&path).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        let err = PlaybackSettings::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }
}
