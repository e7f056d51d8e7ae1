//! Events that can occur in a session

use super::state::{Intent, Method};
use crate::domain::{BirthData, Location};
use crate::gateway::GatewayError;
use serde_json::Value;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    Begin,
    ChooseIntent(Intent),
    ChooseMethod(Method),
    SubmitBirth(BirthData),
    SubmitLocation(Location),
    SkipLocation,
    RetryCalculation,
    FinishCalm,
    SubmitTosses {
        question: String,
        /// Raw values as entered; validated into coin tosses by the transition
        tosses: Vec<i64>,
    },
    RequestInterpretation,
    RequestYearAnalysis {
        year: i32,
    },
    Cancel,
    Reset,

    // Gateway events, tagged with the sequence number the call was issued under
    GatewayResponded {
        seq: u64,
        body: Value,
    },
    GatewayFailed {
        seq: u64,
        error: GatewayError,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Begin => "begin",
            Event::ChooseIntent(_) => "choose_intent",
            Event::ChooseMethod(_) => "choose_method",
            Event::SubmitBirth(_) => "submit_birth",
            Event::SubmitLocation(_) => "submit_location",
            Event::SkipLocation => "skip_location",
            Event::RetryCalculation => "retry_calculation",
            Event::FinishCalm => "finish_calm",
            Event::SubmitTosses { .. } => "submit_tosses",
            Event::RequestInterpretation => "request_interpretation",
            Event::RequestYearAnalysis { .. } => "request_year_analysis",
            Event::Cancel => "cancel",
            Event::Reset => "reset",
            Event::GatewayResponded { .. } => "gateway_responded",
            Event::GatewayFailed { .. } => "gateway_failed",
        }
    }
}
