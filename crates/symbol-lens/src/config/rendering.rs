use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::text_pos::LineMetrics;

pub const MIN_TAB_SIZE: u32 = 1;
pub const MAX_TAB_SIZE: u32 = 32;
pub const DEFAULT_CHARACTER_WIDTH: f64 = 7.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderingSettings {
    pub tab_size: u32,
    /// Advance of one monospace glyph, in pixels.
    pub character_width: f64,
}

impl Default for RenderingSettings {
    fn default() -> Self {
        Self {
            tab_size: 8,
            character_width: DEFAULT_CHARACTER_WIDTH,
        }
    }
}

impl RenderingSettings {
    pub fn metrics(&self) -> LineMetrics {
        LineMetrics::new(self.character_width, self.tab_size)
    }

    pub(crate) fn apply_patch(
        &mut self,
        patch: RenderingSettingsPatch,
    ) {
        if let Some(v) = patch.tab_size {
            self.tab_size = v;
        }
        if let Some(v) = patch.character_width {
            self.character_width = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.tab_size = self.tab_size.clamp(MIN_TAB_SIZE, MAX_TAB_SIZE);
        if !self.character_width.is_finite() || self.character_width <= 0.0 {
            self.character_width = DEFAULT_CHARACTER_WIDTH;
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RenderingSettingsPatch {
    pub(crate) tab_size: Option<u32>,
    pub(crate) character_width: Option<f64>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
