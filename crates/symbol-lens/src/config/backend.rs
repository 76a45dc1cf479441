use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BACKEND_COMMAND: &str = "symbol-lens-backend";

#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_BACKEND_COMMAND.to_string(),
            args: Vec::new(),
        }
    }
}

impl BackendSettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: BackendSettingsPatch,
    ) {
        if let Some(v) = patch.command {
            self.command = v;
        }
        if let Some(v) = patch.args {
            self.args = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.command = self.command.trim().to_string();
        if self.command.is_empty() {
            self.command = DEFAULT_BACKEND_COMMAND.to_string();
        }
        self.args = self.args.iter().map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect();
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct BackendSettingsPatch {
    pub(crate) command: Option<String>,
    pub(crate) args: Option<Vec<String>>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
