use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

pub const MAX_HOVER_DEBOUNCE_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct HoverSettings {
    /// Quiet period after the last pointer move before a position resolves.
    pub debounce_ms: u64,
    /// Underline every known symbol range instead of only the hovered one.
    pub underline: bool,
}

impl Default for HoverSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 80,
            underline: false,
        }
    }
}

impl HoverSettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: HoverSettingsPatch,
    ) {
        if let Some(v) = patch.debounce_ms {
            self.debounce_ms = v;
        }
        if let Some(v) = patch.underline {
            self.underline = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.debounce_ms = self.debounce_ms.min(MAX_HOVER_DEBOUNCE_MS);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct HoverSettingsPatch {
    pub(crate) debounce_ms: Option<u64>,
    pub(crate) underline: Option<bool>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
