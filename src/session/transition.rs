//! Pure state transition function
//!
//! Given the same session, context and event this always produces the same
//! result, with no I/O. An `Err` means the event was refused and the caller
//! keeps the session it passed in.

use super::{Effect, Event, Intent, Method, Outcome, PendingCall, Session, SessionContext, Step};
use crate::conversation::Widget;
use crate::domain::{
    build_bazi_request, build_liuyao_request, hexagram_title, validate_bazi_interpretation,
    validate_bazi_response, validate_liuyao_response, validate_narrative, BirthData,
    LiuyaoInterpretRequest, MAX_BIRTH_YEAR, MIN_BIRTH_YEAR,
};
use crate::error::{DivinationError, DivinationResult};
use crate::gateway::{CallKind, GatewayCall};
use serde_json::Value;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Session) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

pub fn transition(
    session: &Session,
    ctx: &SessionContext,
    event: Event,
) -> DivinationResult<TransitionResult> {
    match event {
        Event::GatewayResponded { seq, body } => Ok(on_response(session, seq, body)),
        Event::GatewayFailed { seq, error } => Ok(match settle(session, seq) {
            Some((next, _)) => failed(next, error.into()),
            None => discard(session),
        }),
        Event::Cancel => cancel(session),
        Event::Reset => Ok(reset(session)),
        event => on_input(session, ctx, event),
    }
}

// ============================================================================
// User input
// ============================================================================

fn on_input(
    session: &Session,
    ctx: &SessionContext,
    event: Event,
) -> DivinationResult<TransitionResult> {
    match (session.step, event) {
        (Step::Greeting, Event::Begin) => {
            let next = Session {
                step: Step::Intent,
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::widget(
                    Widget::IntentSelector {
                        options: Intent::ALL.to_vec(),
                    },
                    "What would you like to ask about?",
                ))
                .with_effect(Effect::PersistSession))
        }

        (Step::Intent, Event::ChooseIntent(intent)) => {
            let next = Session {
                step: Step::SelectMethod,
                intent: Some(intent),
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::user(format!("{} ({})", intent.label(), intent.as_str())))
                .with_effect(Effect::widget(
                    Widget::MethodSelector {
                        options: Method::ALL.to_vec(),
                    },
                    "Choose a method: the four pillars of your birth, or six coin tosses.",
                ))
                .with_effect(Effect::PersistSession))
        }

        (Step::SelectMethod, Event::ChooseMethod(method)) => {
            let (step, widget, prompt) = match method {
                Method::Bazi => (
                    Step::CollectBirth,
                    Widget::BirthDateForm,
                    "Enter your birth date, hour and gender.",
                ),
                Method::Liuyao => (
                    Step::LiuyaoCalm,
                    Widget::BreathGuide,
                    "Breathe slowly and hold your question in mind.",
                ),
            };
            let next = Session {
                step,
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::user(method.label()))
                .with_effect(Effect::widget(widget, prompt))
                .with_effect(Effect::PersistSession))
        }

        (Step::CollectBirth, Event::SubmitBirth(birth)) => {
            birth.validate()?;
            let summary = describe_birth(&birth);
            let next = Session {
                step: Step::CollectLocation,
                birth: Some(birth),
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::user(summary))
                .with_effect(Effect::widget(
                    Widget::LocationPicker {
                        use_true_solar_time: ctx.use_true_solar_time,
                    },
                    "Where were you born? The longitude corrects the hour to true solar time.",
                ))
                .with_effect(Effect::PersistSession))
        }

        (Step::CollectLocation, Event::SubmitLocation(location)) => {
            location.validate()?;
            let said = format!(
                "{} ({:.2}, {:.2})",
                location.city, location.longitude, location.latitude
            );
            let next = Session {
                step: Step::Ritual,
                location: Some(location),
                ..session.clone()
            };
            let request = build_bazi_request(&next, ctx)?;
            Ok(issue(next, GatewayCall::BaziChart(request)).with_effect_first(Effect::user(said)))
        }

        (Step::CollectLocation, Event::SkipLocation) => {
            if ctx.use_true_solar_time {
                return Err(DivinationError::validation(
                    "true solar time correction needs a birth location; choose a city",
                ));
            }
            let next = Session {
                step: Step::Ritual,
                location: None,
                ..session.clone()
            };
            let request = build_bazi_request(&next, ctx)?;
            Ok(issue(next, GatewayCall::BaziChart(request))
                .with_effect_first(Effect::user("Skip the birth place")))
        }

        (Step::Ritual, Event::RetryCalculation) => {
            ensure_idle(session)?;
            let request = build_bazi_request(session, ctx)?;
            Ok(issue(session.clone(), GatewayCall::BaziChart(request)))
        }

        (Step::LiuyaoCalm, Event::FinishCalm) => {
            let next = Session {
                step: Step::LiuyaoToss,
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::widget(
                    Widget::CoinToss { tosses: vec![] },
                    "State your question, then toss three coins six times.",
                ))
                .with_effect(Effect::PersistSession))
        }

        (Step::LiuyaoToss, Event::SubmitTosses { question, tosses }) => {
            ensure_idle(session)?;
            if question.trim().is_empty() {
                return Err(DivinationError::validation("the question is empty"));
            }
            let request = build_liuyao_request(&question, &tosses)?;
            let tossed = Effect::widget(
                Widget::CoinToss {
                    tosses: request.coin_results.to_vec(),
                },
                request.question.clone(),
            );
            Ok(issue(session.clone(), GatewayCall::LiuyaoChart(request)).with_effect_first(tossed))
        }

        (Step::Result, Event::RequestInterpretation) => {
            ensure_idle(session)?;
            let request = build_bazi_request(session, ctx)?;
            Ok(issue(session.clone(), GatewayCall::BaziInterpretation(request)))
        }

        (Step::Result, Event::RequestYearAnalysis { year }) => {
            ensure_idle(session)?;
            if !(MIN_BIRTH_YEAR..=MAX_BIRTH_YEAR).contains(&year) {
                return Err(DivinationError::validation(format!(
                    "year {year} outside {MIN_BIRTH_YEAR}-{MAX_BIRTH_YEAR}"
                )));
            }
            let chart = session
                .bazi_result()
                .ok_or_else(|| DivinationError::incomplete("no chart to analyse"))?;
            let said = match chart.luck_cycle_for_year(year) {
                Some(cycle) => format!("Analyse {year} (大运 {})", cycle.gan_zhi),
                None => format!("Analyse {year}"),
            };
            let request = build_bazi_request(session, ctx)?;
            Ok(issue(session.clone(), GatewayCall::YearAnalysis { request, year })
                .with_effect_first(Effect::user(said)))
        }

        (Step::LiuyaoResult, Event::RequestInterpretation) => {
            ensure_idle(session)?;
            let hexagram = session
                .liuyao_result()
                .ok_or_else(|| DivinationError::incomplete("no hexagram to interpret"))?;
            let request = LiuyaoInterpretRequest::from_result(hexagram);
            Ok(issue(session.clone(), GatewayCall::LiuyaoInterpretation(request)))
        }

        (step, event) => Err(DivinationError::validation(format!(
            "{} is not accepted at step {step}",
            event.name()
        ))),
    }
}

fn ensure_idle(session: &Session) -> DivinationResult<()> {
    if session.is_busy() {
        Err(DivinationError::Busy)
    } else {
        Ok(())
    }
}

/// Allocate the next sequence number and record the call as pending
fn issue(mut next: Session, call: GatewayCall) -> TransitionResult {
    next.sequence += 1;
    let seq = next.sequence;
    let kind = call.kind();
    next.pending = Some(PendingCall { seq, kind });
    TransitionResult::new(next)
        .with_effect(Effect::widget(
            Widget::Loading {
                label: loading_label(kind).to_string(),
            },
            "",
        ))
        .with_effect(Effect::CallGateway { seq, call })
        .with_effect(Effect::PersistSession)
}

impl TransitionResult {
    fn with_effect_first(mut self, effect: Effect) -> Self {
        self.effects.insert(0, effect);
        self
    }
}

fn loading_label(kind: CallKind) -> &'static str {
    match kind {
        CallKind::BaziChart => "Casting the four pillars",
        CallKind::BaziInterpretation => "Reading the chart",
        CallKind::YearAnalysis { .. } => "Reading the year",
        CallKind::LiuyaoChart => "Forming the hexagram",
        CallKind::LiuyaoInterpretation => "Reading the hexagram",
    }
}

fn describe_birth(birth: &BirthData) -> String {
    let minute = birth
        .minute
        .map_or_else(|| "--".to_string(), |m| format!("{m:02}"));
    format!(
        "{}-{:02}-{:02} {:02}:{minute}, {}",
        birth.year, birth.month, birth.day, birth.hour, birth.gender
    )
}

// ============================================================================
// Gateway outcomes
// ============================================================================

/// Take the pending call if `seq` is the one in flight
fn settle(session: &Session, seq: u64) -> Option<(Session, CallKind)> {
    let pending = session.pending.filter(|p| p.seq == seq)?;
    let next = Session {
        pending: None,
        ..session.clone()
    };
    Some((next, pending.kind))
}

/// A response to a cancelled or superseded call changes nothing.
fn discard(session: &Session) -> TransitionResult {
    TransitionResult::new(session.clone())
}

fn failed(next: Session, error: DivinationError) -> TransitionResult {
    let hint = if error.is_retryable() {
        " You can try again."
    } else {
        ""
    };
    TransitionResult::new(next)
        .with_effect(Effect::system(format!("{error}.{hint}")))
        .with_effect(Effect::ReportError(error))
        .with_effect(Effect::PersistSession)
}

fn on_response(session: &Session, seq: u64, body: Value) -> TransitionResult {
    let Some((mut next, kind)) = settle(session, seq) else {
        return discard(session);
    };

    let appended = match kind {
        CallKind::BaziChart => validate_bazi_response(body).map(|chart| {
            let text = format!("Your four pillars: {}", chart.gan_zhi().join(" "));
            next.step = Step::Result;
            next.result = Some(Outcome::Bazi(Box::new(chart.clone())));
            Effect::widget(Widget::BaziChart(Box::new(chart)), text)
        }),
        CallKind::LiuyaoChart => validate_liuyao_response(body).map(|hexagram| {
            let text = format!("Your hexagram: {}", hexagram_title(&hexagram));
            next.step = Step::LiuyaoResult;
            next.result = Some(Outcome::Liuyao(Box::new(hexagram.clone())));
            Effect::widget(Widget::LiuyaoChart(Box::new(hexagram)), text)
        }),
        CallKind::BaziInterpretation => {
            validate_bazi_interpretation(body).map(|reading| Effect::system(reading.content))
        }
        CallKind::YearAnalysis { year } => {
            validate_narrative(body).map(|text| Effect::system(format!("{year}: {text}")))
        }
        CallKind::LiuyaoInterpretation => validate_narrative(body).map(Effect::system),
    };

    match appended {
        Ok(effect) => TransitionResult::new(next)
            .with_effect(effect)
            .with_effect(Effect::PersistSession),
        Err(error) => failed(next, error),
    }
}

// ============================================================================
// Cancel and reset
// ============================================================================

fn cancel(session: &Session) -> DivinationResult<TransitionResult> {
    let pending = session
        .pending
        .ok_or_else(|| DivinationError::validation("no call in flight to cancel"))?;
    let next = Session {
        pending: None,
        sequence: session.sequence + 1,
        ..session.clone()
    };
    Ok(TransitionResult::new(next)
        .with_effect(Effect::AbortCall { seq: pending.seq })
        .with_effect(Effect::system("Cancelled."))
        .with_effect(Effect::PersistSession))
}

fn reset(session: &Session) -> TransitionResult {
    let aborted = session
        .pending
        .map(|pending| Effect::AbortCall { seq: pending.seq });
    TransitionResult::new(session.reset())
        .with_effects(aborted)
        .with_effect(Effect::system("Starting a new reading."))
        .with_effect(Effect::PersistSession)
}
