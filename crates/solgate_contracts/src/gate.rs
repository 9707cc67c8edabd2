#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::takeover::LinkId;
use crate::ReasonCodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateMode {
    Active,
    Locked,
}

impl GateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GateMode::Active => "ACTIVE",
            GateMode::Locked => "LOCKED",
        }
    }
}

/// Whether the caller is rendering a genuinely new page view or repainting one
/// it already counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    NewView,
    ReRender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub link_id: LinkId,
    pub mode: GateMode,
    /// Runs left after this render, floored at zero for display.
    pub remaining: i64,
    /// `None` when no takeover window is being tracked for the profile.
    pub remaining_time_ms: Option<u64>,
    pub reason_code: ReasonCodeId,
}

impl GateDecision {
    pub fn is_active(&self) -> bool {
        self.mode == GateMode::Active
    }
}
