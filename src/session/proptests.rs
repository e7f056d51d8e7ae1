//! Property-based tests for the session state machine
//!
//! Random event sequences are driven from a fresh session and the flow
//! invariants are checked after every step.

use super::state::*;
use super::transition::*;
use super::*;
use crate::domain::fixtures::{basic_chart, extended_chart, hexagram};
use crate::domain::{BirthData, Gender, Location};
use crate::error::DivinationError;
use crate::gateway::{GatewayError, GatewayErrorKind};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new("test-session")
}

/// Gateway events are generated against whatever call is current when they
/// are applied, so they are described relative to it.
#[derive(Debug, Clone)]
enum SeqChoice {
    Current,
    Stale(u64),
}

#[derive(Debug, Clone)]
enum Action {
    Input(Event),
    Respond(SeqChoice, Value),
    Fail(SeqChoice, GatewayError),
}

impl Action {
    fn resolve(self, session: &Session) -> Event {
        let seq = |choice: SeqChoice| match choice {
            SeqChoice::Current => session.pending.map_or(session.sequence, |p| p.seq),
            SeqChoice::Stale(back) => session.sequence.saturating_sub(back + 1),
        };
        match self {
            Action::Input(event) => event,
            Action::Respond(choice, body) => Event::GatewayResponded { seq: seq(choice), body },
            Action::Fail(choice, error) => Event::GatewayFailed { seq: seq(choice), error },
        }
    }
}

fn is_valid_session(session: &Session) -> bool {
    let result_matches_step = session.result.is_some() == session.step.holds_result();
    let birth_where_needed = !session.step.requires_birth() || session.birth.is_some();
    let pending_is_latest = session.pending.map_or(true, |p| p.seq == session.sequence);
    let result_matches_branch = match (&session.result, session.step) {
        (Some(Outcome::Bazi(_)), Step::Result) | (Some(Outcome::Liuyao(_)), Step::LiuyaoResult) => true,
        (None, _) => true,
        _ => false,
    };
    result_matches_step && birth_where_needed && pending_is_latest && result_matches_branch
}

fn effects_are_valid(effects: &[Effect], session: &Session) -> bool {
    let calls: Vec<u64> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::CallGateway { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect();
    match calls.as_slice() {
        [] => true,
        [seq] => session.pending.is_some_and(|p| p.seq == *seq),
        _ => false,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![Just(Intent::Career), Just(Intent::Love), Just(Intent::Fortune)]
}

fn arb_method() -> impl Strategy<Value = Method> {
    prop_oneof![Just(Method::Bazi), Just(Method::Liuyao)]
}

fn arb_birth() -> impl Strategy<Value = BirthData> {
    (
        1890i32..2110,
        0u32..14,
        0u32..33,
        0u32..26,
        proptest::option::of(0u32..62),
        any::<bool>(),
    )
        .prop_map(|(year, month, day, hour, minute, male)| BirthData {
            year,
            month,
            day,
            hour,
            minute,
            gender: if male { Gender::Male } else { Gender::Female },
        })
}

fn arb_location() -> impl Strategy<Value = Location> {
    ("[a-z]{0,8}", -200.0f64..200.0, -100.0f64..100.0).prop_map(|(city, longitude, latitude)| {
        Location {
            city,
            longitude,
            latitude,
        }
    })
}

fn arb_tosses() -> impl Strategy<Value = Vec<i64>> {
    prop_oneof![
        proptest::collection::vec(6i64..=9, 6),
        proptest::collection::vec(4i64..=11, 0..8),
    ]
}

fn arb_body() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(basic_chart()),
        Just(extended_chart()),
        Just(hexagram()),
        Just(json!({ "success": true, "content": "吉" })),
        Just(json!({ "success": false, "error": "declined" })),
        Just(json!({ "chart": {} })),
        Just(Value::String("<html>".to_string())),
    ]
}

fn arb_gateway_error() -> impl Strategy<Value = GatewayError> {
    prop_oneof![
        Just(GatewayErrorKind::Network),
        Just(GatewayErrorKind::Timeout),
        Just(GatewayErrorKind::ServerError),
        Just(GatewayErrorKind::InvalidRequest),
        Just(GatewayErrorKind::NotFound),
    ]
    .prop_map(|kind| GatewayError::new(kind, "failed"))
}

fn arb_seq_choice() -> impl Strategy<Value = SeqChoice> {
    prop_oneof![
        3 => Just(SeqChoice::Current),
        1 => (0u64..3).prop_map(SeqChoice::Stale),
    ]
}

fn arb_input() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Begin),
        arb_intent().prop_map(Event::ChooseIntent),
        arb_method().prop_map(Event::ChooseMethod),
        arb_birth().prop_map(Event::SubmitBirth),
        arb_location().prop_map(Event::SubmitLocation),
        Just(Event::SkipLocation),
        Just(Event::RetryCalculation),
        Just(Event::FinishCalm),
        ("[a-z ]{0,10}", arb_tosses())
            .prop_map(|(question, tosses)| Event::SubmitTosses { question, tosses }),
        Just(Event::RequestInterpretation),
        (1850i32..2150).prop_map(|year| Event::RequestYearAnalysis { year }),
        Just(Event::Cancel),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => arb_input().prop_map(Action::Input),
        3 => (arb_seq_choice(), arb_body()).prop_map(|(seq, body)| Action::Respond(seq, body)),
        1 => (arb_seq_choice(), arb_gateway_error()).prop_map(|(seq, err)| Action::Fail(seq, err)),
        1 => Just(Action::Input(Event::Reset)),
    ]
}

/// Event prefix that reaches `ritual` with a chart call in flight
fn to_ritual() -> Vec<Event> {
    vec![
        Event::Begin,
        Event::ChooseIntent(Intent::Career),
        Event::ChooseMethod(Method::Bazi),
        Event::SubmitBirth(BirthData {
            year: 1995,
            month: 10,
            day: 27,
            hour: 8,
            minute: None,
            gender: Gender::Female,
        }),
        Event::SubmitLocation(Location {
            city: "上海".to_string(),
            longitude: 121.47,
            latitude: 31.23,
        }),
    ]
}

fn drive(events: Vec<Event>) -> Session {
    let ctx = test_context();
    events.into_iter().fold(Session::default(), |session, event| {
        transition(&session, &ctx, event)
            .map(|r| r.new_state)
            .unwrap_or(session)
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Invariant 1: every accepted event keeps the session consistent
    #[test]
    fn prop_transitions_preserve_validity(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let ctx = test_context();
        let mut session = Session::default();

        for action in actions {
            let event = action.resolve(&session);
            if let Ok(result) = transition(&session, &ctx, event) {
                session = result.new_state;
                prop_assert!(is_valid_session(&session), "Invalid session: {:?}", session);
                prop_assert!(
                    effects_are_valid(&result.effects, &session),
                    "Invalid effects for {:?}: {:?}",
                    session,
                    result.effects
                );
            }
        }
    }

    // Invariant 2: the step only moves along the declared table (or resets)
    #[test]
    fn prop_step_follows_table(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let ctx = test_context();
        let mut session = Session::default();

        for action in actions {
            let event = action.resolve(&session);
            let is_reset = matches!(event, Event::Reset);
            if let Ok(result) = transition(&session, &ctx, event) {
                let (from, to) = (session.step, result.new_state.step);
                prop_assert!(
                    from == to || from.successors().contains(&to) || (is_reset && to == Step::Greeting),
                    "illegal move {} -> {}", from, to
                );
                session = result.new_state;
            }
        }
    }

    // Invariant 3: birth data, once set, is unchanged until reset
    #[test]
    fn prop_birth_immutable_until_reset(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let ctx = test_context();
        let mut session = drive(to_ritual());
        let original = session.birth.clone();
        prop_assert!(original.is_some());

        for action in actions {
            let event = action.resolve(&session);
            if matches!(event, Event::Reset) {
                break;
            }
            if let Ok(result) = transition(&session, &ctx, event) {
                session = result.new_state;
                prop_assert_eq!(&session.birth, &original);
            }
        }
    }

    // Invariant 4: a second call while one is pending is Busy and changes nothing
    #[test]
    fn prop_busy_rejects_second_call(tosses in proptest::collection::vec(6i64..=9, 6)) {
        let ctx = test_context();
        let ritual = drive(to_ritual());
        prop_assert!(ritual.is_busy());
        prop_assert_eq!(
            transition(&ritual, &ctx, Event::RetryCalculation).unwrap_err(),
            DivinationError::Busy
        );

        let tossing = drive(vec![
            Event::Begin,
            Event::ChooseIntent(Intent::Love),
            Event::ChooseMethod(Method::Liuyao),
            Event::FinishCalm,
            Event::SubmitTosses { question: "q".to_string(), tosses: tosses.clone() },
        ]);
        prop_assert!(tossing.is_busy());
        let before = tossing.clone();
        let err = transition(&tossing, &ctx, Event::SubmitTosses { question: "q".to_string(), tosses })
            .unwrap_err();
        prop_assert_eq!(err, DivinationError::Busy);
        prop_assert_eq!(tossing, before);
    }

    // Invariant 5: late responses never touch the session
    #[test]
    fn prop_late_response_discarded(body in arb_body(), back in 0u64..5, cancel in any::<bool>()) {
        let ctx = test_context();
        let mut session = drive(to_ritual());
        let issued = session.pending.map(|p| p.seq).unwrap_or_default();
        session = if cancel {
            transition(&session, &ctx, Event::Cancel).unwrap().new_state
        } else {
            transition(&session, &ctx, Event::Reset).unwrap().new_state
        };

        let stale = issued.saturating_sub(back);
        let result = transition(&session, &ctx, Event::GatewayResponded { seq: stale, body }).unwrap();
        prop_assert_eq!(&result.new_state, &session);
        prop_assert!(result.effects.is_empty());
    }

    // Invariant 6: failures never advance the step or set a result
    #[test]
    fn prop_failure_keeps_step(error in arb_gateway_error()) {
        let ctx = test_context();
        let session = drive(to_ritual());
        let seq = session.pending.map(|p| p.seq).unwrap_or_default();
        let result = transition(&session, &ctx, Event::GatewayFailed { seq, error }).unwrap();
        prop_assert_eq!(result.new_state.step, Step::Ritual);
        prop_assert!(result.new_state.result.is_none());
        prop_assert!(!result.new_state.is_busy());
        prop_assert!(result.effects.iter().any(|e| matches!(e, Effect::ReportError(DivinationError::Gateway(_)))));
    }

    // Invariant 7: reset is a full reinitialisation apart from the counter
    #[test]
    fn prop_reset_reinitialises(actions in proptest::collection::vec(arb_action(), 0..30)) {
        let ctx = test_context();
        let mut session = Session::default();
        for action in actions {
            let event = action.resolve(&session);
            if let Ok(result) = transition(&session, &ctx, event) {
                session = result.new_state;
            }
        }
        let after = transition(&session, &ctx, Event::Reset).unwrap().new_state;
        prop_assert_eq!(&after, &Session { sequence: after.sequence, ..Session::default() });
        prop_assert!(after.sequence > session.sequence);
    }
}

#[test]
fn test_rejected_event_leaves_session_untouched() {
    let ctx = test_context();
    let session = drive(vec![Event::Begin, Event::ChooseIntent(Intent::Career)]);
    let before = session.clone();
    assert!(transition(&session, &ctx, Event::SkipLocation).is_err());
    assert!(transition(&session, &ctx, Event::FinishCalm).is_err());
    assert_eq!(session, before);
    assert_eq!(session.step, Step::SelectMethod);
}
