use serde::{Deserialize, Serialize};

/// Result of asking whether a session may send another message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub used: u32,
    pub limit: u32,
    pub limit_reached: bool,
}

impl UsageSnapshot {
    pub fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            limit_reached: used >= limit,
        }
    }
}
