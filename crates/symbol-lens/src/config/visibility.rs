use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

pub const MAX_ROOT_MARGIN_PX: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilitySettings {
    /// How far outside the viewport a diff region may be and still count as
    /// visible for stencil prefetching.
    pub root_margin_px: u32,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            root_margin_px: 200,
        }
    }
}

impl VisibilitySettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: VisibilitySettingsPatch,
    ) {
        if let Some(v) = patch.root_margin_px {
            self.root_margin_px = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.root_margin_px = self.root_margin_px.min(MAX_ROOT_MARGIN_PX);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct VisibilitySettingsPatch {
    pub(crate) root_margin_px: Option<u32>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
