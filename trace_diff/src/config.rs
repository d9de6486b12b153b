use serde::{Deserialize, Serialize};

/// Options shared by the canonicalizers and the comparator of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceConfig {
    /// Whether post-state roots take part in the comparison. When unset,
    /// only the per-instruction state is checked.
    pub include_state_root: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            include_state_root: true,
        }
    }
}

impl TraceConfig {
    pub const fn without_state_root() -> Self {
        Self {
            include_state_root: false,
        }
    }
}
