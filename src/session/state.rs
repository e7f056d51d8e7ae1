//! Session state types

use crate::domain::{BaziResponse, BirthData, LiuyaoResponse, Location};
use crate::gateway::CallKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Steps
// ============================================================================

/// Where the user is in the guided flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    #[default]
    Greeting,
    Intent,
    SelectMethod,
    CollectBirth,
    CollectLocation,
    Ritual,
    Result,
    LiuyaoCalm,
    LiuyaoToss,
    LiuyaoResult,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Greeting => "greeting",
            Step::Intent => "intent",
            Step::SelectMethod => "select-method",
            Step::CollectBirth => "collect-birth",
            Step::CollectLocation => "collect-location",
            Step::Ritual => "ritual",
            Step::Result => "result",
            Step::LiuyaoCalm => "liuyao-calm",
            Step::LiuyaoToss => "liuyao-toss",
            Step::LiuyaoResult => "liuyao-result",
        }
    }
}

// Flow structure, checked by the property tests
#[cfg(test)]
impl Step {
    pub const ALL: [Step; 10] = [
        Step::Greeting,
        Step::Intent,
        Step::SelectMethod,
        Step::CollectBirth,
        Step::CollectLocation,
        Step::Ritual,
        Step::Result,
        Step::LiuyaoCalm,
        Step::LiuyaoToss,
        Step::LiuyaoResult,
    ];

    /// Forward edges of the flow. Reset back to `greeting` is allowed from
    /// anywhere and is not listed.
    pub fn successors(self) -> &'static [Step] {
        match self {
            Step::Greeting => &[Step::Intent],
            Step::Intent => &[Step::SelectMethod],
            Step::SelectMethod => &[Step::CollectBirth, Step::LiuyaoCalm],
            Step::CollectBirth => &[Step::CollectLocation],
            Step::CollectLocation => &[Step::Ritual],
            Step::Ritual => &[Step::Result],
            Step::LiuyaoCalm => &[Step::LiuyaoToss],
            Step::LiuyaoToss => &[Step::LiuyaoResult],
            Step::Result | Step::LiuyaoResult => &[],
        }
    }

    /// The two terminal steps, and the only ones where a result exists
    pub fn holds_result(self) -> bool {
        matches!(self, Step::Result | Step::LiuyaoResult)
    }

    pub fn requires_birth(self) -> bool {
        matches!(self, Step::CollectLocation | Step::Ritual | Step::Result)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Choices
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Career,
    Love,
    Fortune,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Career, Intent::Love, Intent::Fortune];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Career => "career",
            Intent::Love => "love",
            Intent::Fortune => "fortune",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::Career => "事业",
            Intent::Love => "感情",
            Intent::Fortune => "运势",
        }
    }
}

/// The two divination branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Bazi,
    Liuyao,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Bazi, Method::Liuyao];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Bazi => "bazi",
            Method::Liuyao => "liuyao",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::Bazi => "八字",
            Method::Liuyao => "六爻",
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Calculation output owned by the session; replaced, never merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "lowercase")]
pub enum Outcome {
    Bazi(Box<BaziResponse>),
    Liuyao(Box<LiuyaoResponse>),
}

/// The in-flight gateway call. At most one per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
    pub seq: u64,
    pub kind: CallKind,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Session {
    pub step: Step,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub birth: Option<BirthData>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub result: Option<Outcome>,
    /// Bumped on every issued, cancelled or reset call. Never decreases, even
    /// across reset, so responses to older calls can be recognised.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub pending: Option<PendingCall>,
}

impl Session {
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Full reinitialisation that keeps only the sequence counter
    pub fn reset(&self) -> Self {
        Self {
            sequence: self.sequence + 1,
            ..Self::default()
        }
    }

    /// A snapshot loaded after a restart cannot still have a call in flight.
    pub fn restored(mut self) -> Self {
        if self.pending.take().is_some() {
            self.sequence += 1;
        }
        self
    }

    pub fn bazi_result(&self) -> Option<&BaziResponse> {
        match &self.result {
            Some(Outcome::Bazi(chart)) => Some(chart),
            _ => None,
        }
    }

    pub fn liuyao_result(&self) -> Option<&LiuyaoResponse> {
        match &self.result {
            Some(Outcome::Liuyao(hexagram)) => Some(hexagram),
            _ => None,
        }
    }
}

/// Context for a session (immutable configuration)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub use_true_solar_time: bool,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            use_true_solar_time: true,
        }
    }

    pub fn with_true_solar_time(mut self, enabled: bool) -> Self {
        self.use_true_solar_time = enabled;
        self
    }
}
