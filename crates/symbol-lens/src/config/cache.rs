use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_IN_FLIGHT};

pub const MIN_CONCURRENT_LOADS: usize = 1;
pub const MAX_CONCURRENT_LOADS: usize = 64;
pub const MIN_LOAD_TIMEOUT_MS: u64 = 100;
pub const MAX_LOAD_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Symbol loads allowed in flight at once. Keys requested while the limit
    /// is reached wait, and are dropped if a running load aliases them.
    pub max_concurrent_loads: usize,
    /// Upper bound on a single load; a load past it fails and frees its slot.
    pub load_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_IN_FLIGHT,
            load_timeout_ms: u64::try_from(DEFAULT_LOAD_TIMEOUT.as_millis()).unwrap_or(MAX_LOAD_TIMEOUT_MS),
        }
    }
}

impl CacheSettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: CacheSettingsPatch,
    ) {
        if let Some(v) = patch.max_concurrent_loads {
            self.max_concurrent_loads = v;
        }
        if let Some(v) = patch.load_timeout_ms {
            self.load_timeout_ms = v;
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub(crate) fn normalize(&mut self) {
        self.max_concurrent_loads = self.max_concurrent_loads.clamp(MIN_CONCURRENT_LOADS, MAX_CONCURRENT_LOADS);
        self.load_timeout_ms = self.load_timeout_ms.clamp(MIN_LOAD_TIMEOUT_MS, MAX_LOAD_TIMEOUT_MS);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct CacheSettingsPatch {
    pub(crate) max_concurrent_loads: Option<usize>,
    pub(crate) load_timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
