//! Layered settings.
//!
//! Settings are split into one file per category. [`LensSettings`]
//! aggregates all categories and merges partial JSON payloads or a
//! `symbol-lens.toml` file over the defaults.

pub(crate) mod backend;
pub(crate) mod cache;
pub(crate) mod hover;
pub(crate) mod logging;
pub(crate) mod rendering;
pub(crate) mod visibility;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub use backend::{BackendSettings, DEFAULT_BACKEND_COMMAND};
use backend::BackendSettingsPatch;
pub use cache::{CacheSettings, MAX_CONCURRENT_LOADS, MAX_LOAD_TIMEOUT_MS, MIN_CONCURRENT_LOADS, MIN_LOAD_TIMEOUT_MS};
use cache::CacheSettingsPatch;
pub use hover::{HoverSettings, MAX_HOVER_DEBOUNCE_MS};
use hover::HoverSettingsPatch;
use logging::LoggingSettingsPatch;
pub use logging::{LogLevel, LoggingSettings};
pub use rendering::{DEFAULT_CHARACTER_WIDTH, MAX_TAB_SIZE, MIN_TAB_SIZE, RenderingSettings};
use rendering::RenderingSettingsPatch;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
pub use visibility::{MAX_ROOT_MARGIN_PX, VisibilitySettings};
use visibility::VisibilitySettingsPatch;

use crate::error::ConfigError;

pub const SETTINGS_SECTION_KEY: &str = "symbol-lens";
pub const CONFIG_FILENAME: &str = "symbol-lens.toml";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LensSettings {
    pub hover: HoverSettings,
    pub rendering: RenderingSettings,
    pub cache: CacheSettings,
    pub visibility: VisibilitySettings,
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
}

impl LensSettings {
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let mut settings = Self::default();
        if let Some(payload) = payload {
            settings = settings.merged_with_payload(payload);
        }
        settings
    }

    /// Defaults overlaid with a `symbol-lens.toml` file.
    pub fn load_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        let payload: Value = toml::from_str(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        debug!("[config] loaded {}", path.display());
        Ok(Self::from_payload(Some(&payload)))
    }

    pub fn merged_with_payload(
        &self,
        payload: &Value,
    ) -> Self {
        let mut merged = self.clone();

        for candidate in payload_candidates(payload) {
            if let Ok(patch) = serde_json::from_value::<LensSettingsPatch>(candidate.clone()) {
                merged.apply_patch(patch);
            }
        }

        merged.normalize();
        merged
    }

    fn apply_patch(
        &mut self,
        patch: LensSettingsPatch,
    ) {
        if let Some(p) = patch.hover {
            self.hover.apply_patch(p);
        }
        if let Some(p) = patch.rendering {
            self.rendering.apply_patch(p);
        }
        if let Some(p) = patch.cache {
            self.cache.apply_patch(p);
        }
        if let Some(p) = patch.visibility {
            self.visibility.apply_patch(p);
        }
        if let Some(p) = patch.backend {
            self.backend.apply_patch(p);
        }
        if let Some(p) = patch.logging {
            self.logging.apply_patch(p);
        }
    }

    fn normalize(&mut self) {
        self.hover.normalize();
        self.rendering.normalize();
        self.cache.normalize();
        self.visibility.normalize();
        self.backend.normalize();
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct LensSettingsPatch {
    hover: Option<HoverSettingsPatch>,
    rendering: Option<RenderingSettingsPatch>,
    cache: Option<CacheSettingsPatch>,
    visibility: Option<VisibilitySettingsPatch>,
    backend: Option<BackendSettingsPatch>,
    logging: Option<LoggingSettingsPatch>,
    #[serde(flatten)]
    _extra: HashMap<String, Value>,
}

fn payload_candidates(payload: &Value) -> Vec<Value> {
    let mut candidates = Vec::new();
    candidates.push(payload.clone());
    if let Some(scoped) = payload.get(SETTINGS_SECTION_KEY) {
        candidates.push(scoped.clone());
    }
    candidates
}

/// Walks parent directories from `start` looking for `symbol-lens.toml`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = if start.is_file() {
        start.parent()?
    } else {
        start
    };
    loop {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
#[path = "../../tests/src/config/config_tests.rs"]
mod tests;
