//! Line-oriented front-end
//!
//! Parses one input line against the current step and renders log entries
//! and widgets as plain text. Nothing here touches the session directly:
//! parsed input becomes an `Event` for the runtime, or a stateless calendar
//! query that `main` sends straight to the gateway.

use crate::conversation::{ConversationLog, Message, Role, Widget, WidgetKind};
use crate::domain::{
    BaziResponse, BirthData, CalendarConvertRequest, ConvertedDate, Gender, LiuyaoResponse,
    Location, Polarity, SolarCorrection, TodayInfo,
};
use crate::error::{DivinationError, DivinationResult};
use crate::session::{Event, Intent, Method, Step};

pub const HELP: &str = "\
commands:
  help            show this text
  reset           start over
  cancel          abandon the calculation in flight
  retry           recalculate after a failure
  ai              ask for the AI reading of the current result
  year <YYYY>     analyse one year of the current chart
  today           today's almanac
  convert solar <YYYY-MM-DD>
  convert lunar <YYYY-MM-DD> [leap]
  solar           true solar time for the collected birth data
  quit            leave (the session is kept)";

/// What one line of input asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Event(Event),
    /// Throw six coins locally, then submit them with the question
    Toss { question: String },
    Today,
    Convert(CalendarConvertRequest),
    SolarTime,
    Help,
    Quit,
}

/// Parse a line typed while the session is at `step`.
/// `Ok(None)` means there was nothing to do.
pub fn parse_input(line: &str, step: Step) -> DivinationResult<Option<Input>> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default().to_lowercase();

    let global = match head.as_str() {
        "quit" | "exit" => Some(Input::Quit),
        "help" | "?" => Some(Input::Help),
        "reset" => Some(Input::Event(Event::Reset)),
        "cancel" => Some(Input::Event(Event::Cancel)),
        "retry" => Some(Input::Event(Event::RetryCalculation)),
        "today" => Some(Input::Today),
        "solar" => Some(Input::SolarTime),
        "convert" => Some(Input::Convert(parse_convert(&words.by_ref().collect::<Vec<_>>())?)),
        _ => None,
    };
    if global.is_some() {
        return Ok(global);
    }

    let event = match step {
        Step::Greeting => Event::Begin,
        Step::LiuyaoCalm => Event::FinishCalm,
        _ if line.is_empty() => return Ok(None),
        Step::Intent => Event::ChooseIntent(parse_intent(line)?),
        Step::SelectMethod => Event::ChooseMethod(parse_method(line)?),
        Step::CollectBirth => Event::SubmitBirth(parse_birth(line)?),
        Step::CollectLocation if head == "skip" => Event::SkipLocation,
        Step::CollectLocation => Event::SubmitLocation(parse_location(line)?),
        Step::Ritual => {
            return Err(DivinationError::validation(
                "the chart is being calculated; type retry if it failed",
            ))
        }
        Step::LiuyaoToss => return parse_tosses(line).map(Some),
        Step::Result | Step::LiuyaoResult => match head.as_str() {
            "ai" => Event::RequestInterpretation,
            "year" => Event::RequestYearAnalysis {
                year: parse_number(words.next(), "year")?,
            },
            _ => return Err(DivinationError::validation(format!("unknown command '{head}'"))),
        },
    };
    Ok(Some(Input::Event(event)))
}

fn parse_intent(word: &str) -> DivinationResult<Intent> {
    pick(word, &Intent::ALL, |i| [i.as_str(), i.label()])
        .ok_or_else(|| DivinationError::validation(format!("'{word}' is not one of the intents")))
}

fn parse_method(word: &str) -> DivinationResult<Method> {
    pick(word, &Method::ALL, |m| [m.as_str(), m.label()])
        .ok_or_else(|| DivinationError::validation(format!("'{word}' is not one of the methods")))
}

/// Match a choice by name, label, or 1-based position in the menu
fn pick<T: Copy>(word: &str, all: &[T], names: impl Fn(T) -> [&'static str; 2]) -> Option<T> {
    let word = word.trim().to_lowercase();
    if let Ok(n) = word.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| all.get(i)).copied();
    }
    all.iter()
        .copied()
        .find(|&item| names(item).iter().any(|name| *name == word))
}

/// `YYYY-MM-DD HH[:MM] f|m`
fn parse_birth(line: &str) -> DivinationResult<BirthData> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [date, time, gender] = parts[..] else {
        return Err(DivinationError::validation(
            "expected: YYYY-MM-DD HH[:MM] f|m",
        ));
    };

    let (year, month, day) = parse_date(date)?;
    let (hour, minute) = match time.split_once(':') {
        Some((h, m)) => (parse_number(Some(h), "hour")?, Some(parse_number(Some(m), "minute")?)),
        None => (parse_number(Some(time), "hour")?, None),
    };
    let gender = match gender.to_lowercase().as_str() {
        "f" | "female" | "女" => Gender::Female,
        "m" | "male" | "男" => Gender::Male,
        other => return Err(DivinationError::validation(format!("unknown gender '{other}'"))),
    };

    Ok(BirthData {
        year,
        month,
        day,
        hour,
        minute,
        gender,
    })
}

/// `<city> <longitude> <latitude>`; the city may contain spaces
fn parse_location(line: &str) -> DivinationResult<Location> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [city @ .., longitude, latitude] = &parts[..] else {
        return Err(DivinationError::validation(
            "expected: <city> <longitude> <latitude>",
        ));
    };
    if city.is_empty() {
        return Err(DivinationError::validation("city is missing"));
    }
    Ok(Location {
        city: city.join(" "),
        longitude: parse_number(Some(*longitude), "longitude")?,
        latitude: parse_number(Some(*latitude), "latitude")?,
    })
}

/// `<question> | 7 9 7 7 8 9` submits typed tosses, a bare question throws
fn parse_tosses(line: &str) -> DivinationResult<Input> {
    let Some((question, tosses)) = line.split_once('|') else {
        return Ok(Input::Toss {
            question: line.to_string(),
        });
    };
    let tosses = tosses
        .split_whitespace()
        .map(|t| parse_number(Some(t), "toss"))
        .collect::<DivinationResult<Vec<i64>>>()?;
    Ok(Input::Event(Event::SubmitTosses {
        question: question.trim().to_string(),
        tosses,
    }))
}

fn parse_convert(args: &[&str]) -> DivinationResult<CalendarConvertRequest> {
    match args {
        ["solar", date] => {
            let (y, m, d) = parse_date(date)?;
            CalendarConvertRequest::solar(y, m, d)
        }
        ["lunar", date, rest @ ..] => {
            let (y, m, d) = parse_date(date)?;
            let leap = matches!(rest, ["leap"] | ["闰"]);
            CalendarConvertRequest::lunar(y, m, d, leap)
        }
        _ => Err(DivinationError::validation(
            "expected: convert solar|lunar YYYY-MM-DD [leap]",
        )),
    }
}

fn parse_date(s: &str) -> DivinationResult<(i32, u32, u32)> {
    let mut parts = s.splitn(3, '-');
    Ok((
        parse_number(parts.next(), "year")?,
        parse_number(parts.next(), "month")?,
        parse_number(parts.next(), "day")?,
    ))
}

fn parse_number<T: std::str::FromStr>(s: Option<&str>, what: &str) -> DivinationResult<T> {
    let s = s.unwrap_or_default();
    s.parse()
        .map_err(|_| DivinationError::validation(format!("{what} '{s}' is not a number")))
}

// ============================================================================
// Rendering
// ============================================================================

pub fn prompt(step: Step, busy: bool) -> String {
    if busy {
        return "(waiting) > ".to_string();
    }
    format!("[{step}] > ")
}

pub fn render_message(message: &Message) -> String {
    let mut lines = Vec::new();
    if !message.content.is_empty() {
        let marker = match message.role {
            Role::User => ">",
            Role::System | Role::Widget => "·",
        };
        lines.push(format!("{marker} {}", message.content));
    }
    if let Some(widget) = &message.widget {
        lines.extend(render_widget(widget));
    }
    lines.join("\n")
}

/// The widget that asks for whatever `step` is waiting on
pub fn prompt_widget(step: Step) -> Option<WidgetKind> {
    match step {
        Step::Greeting | Step::Ritual => None,
        Step::Intent => Some(WidgetKind::IntentSelector),
        Step::SelectMethod => Some(WidgetKind::MethodSelector),
        Step::CollectBirth => Some(WidgetKind::BirthDateForm),
        Step::CollectLocation => Some(WidgetKind::LocationPicker),
        Step::LiuyaoCalm => Some(WidgetKind::BreathGuide),
        Step::LiuyaoToss => Some(WidgetKind::CoinToss),
        Step::Result => Some(WidgetKind::BaziChart),
        Step::LiuyaoResult => Some(WidgetKind::LiuyaoChart),
    }
}

/// Shown when a saved session is picked up again: a summary of the earlier
/// log with the user's last answer, then the latest widget for the current step.
pub fn resume_lines(log: &ConversationLog, step: Step) -> Vec<String> {
    let mut lines = Vec::new();
    if !log.is_empty() {
        lines.push(format!("· resuming at {step} after {} messages", log.len()));
    }
    if let Some(answer) = log.iter().rev().find(|m| m.role == Role::User) {
        lines.push(render_message(answer));
    }
    if step == Step::Ritual {
        lines.push("· the chart calculation was interrupted; type retry".to_string());
    }
    if let Some(message) = prompt_widget(step).and_then(|kind| log.latest_widget_of_type(kind)) {
        lines.push(render_message(message));
    }
    lines
}

pub fn render_widget(widget: &Widget) -> Vec<String> {
    match widget {
        Widget::IntentSelector { options } => options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("  [{}] {} ({})", i + 1, o.label(), o.as_str()))
            .collect(),
        Widget::MethodSelector { options } => options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("  [{}] {} ({})", i + 1, o.label(), o.as_str()))
            .collect(),
        Widget::BirthDateForm => vec!["  format: YYYY-MM-DD HH[:MM] f|m".to_string()],
        Widget::LocationPicker { use_true_solar_time } => {
            let mut lines = vec!["  format: <city> <longitude> <latitude>".to_string()];
            if *use_true_solar_time {
                lines.push("  the birth time will be corrected to true solar time".to_string());
            } else {
                lines.push("  or skip to chart without a birth place".to_string());
            }
            lines
        }
        Widget::BreathGuide => vec!["  breathe in ... hold ... breathe out. press enter when calm".to_string()],
        Widget::CoinToss { tosses } if tosses.is_empty() => vec![
            "  type a question to throw the coins,".to_string(),
            "  or <question> | six values from 6 to 9, first line first".to_string(),
        ],
        Widget::CoinToss { tosses } => {
            let values: Vec<String> = tosses.iter().map(|t| t.value().to_string()).collect();
            vec![format!("  coins: {}", values.join(" "))]
        }
        Widget::BaziChart(chart) => render_bazi(chart),
        Widget::LiuyaoChart(hexagram) => render_hexagram(hexagram),
        Widget::Loading { label } => vec![format!("  ... {label}")],
    }
}

fn render_bazi(chart: &BaziResponse) -> Vec<String> {
    let birth = &chart.birth_info;
    let master = &chart.chart.day_master;
    let mut lines = vec![
        format!("  四柱  {}", chart.gan_zhi().join(" ")),
        format!("  日主  {} ({}, {})", master.gan, master.element, master.yinyang),
    ];

    let mut born = format!("  公历 {}  农历 {}", birth.solar_date, birth.lunar_date);
    if let Some(true_time) = &birth.true_solar_time {
        born.push_str(&format!("  真太阳时 {true_time}"));
    }
    lines.push(born);

    if !chart.chart.elements_count.is_empty() {
        let counts: Vec<String> = chart
            .chart
            .elements_count
            .iter()
            .map(|(element, n)| format!("{element}{n}"))
            .collect();
        lines.push(format!("  五行  {}", counts.join(" ")));
    }

    if let Some(analysis) = chart.analysis() {
        let mut summary = format!(
            "  旺衰  {} ({:.1})",
            analysis.strength.level, analysis.strength.score
        );
        if let Some(yong) = &analysis.useful_gods.yong_shen {
            summary.push_str(&format!("  用神 {yong}"));
        }
        if let Some(main) = &analysis.pattern.main_pattern {
            summary.push_str(&format!("  格局 {}", main.name));
        }
        lines.push(summary);
    }

    if !chart.luck_cycles.is_empty() {
        let cycles: Vec<String> = chart
            .luck_cycles
            .iter()
            .map(|c| format!("{}-{} {}", c.start_age, c.end_age, c.gan_zhi))
            .collect();
        lines.push(format!("  大运  {}", cycles.join(" | ")));
    }
    lines
}

fn render_hexagram(result: &LiuyaoResponse) -> Vec<String> {
    let mut lines = vec![format!("  本卦 {}", result.original_hexagram.name)];
    if let Some(changed) = &result.changed_hexagram {
        lines[0].push_str(&format!("  变卦 {}", changed.name));
    }

    // Top line first, the way a hexagram is drawn
    if result.yaos.is_empty() {
        for toss in result.coin_results.iter().rev() {
            lines.push(format!("  {}", line_glyph(toss.is_yang(), toss.is_moving())));
        }
    } else {
        for yao in result.yaos.iter().rev() {
            let mut row = format!(
                "  {} {}",
                line_glyph(yao.polarity == Polarity::Yang, yao.changing),
                yao.position_name
            );
            if yao.is_world {
                row.push_str(" 世");
            } else if yao.is_response {
                row.push_str(" 应");
            }
            lines.push(row);
        }
    }

    if let Some(hint) = &result.interpretation_hint {
        lines.push(format!("  {hint}"));
    }
    lines
}

fn line_glyph(yang: bool, moving: bool) -> &'static str {
    match (yang, moving) {
        (true, false) => "━━━━━━━  ",
        (true, true) => "━━━━━━━ ○",
        (false, false) => "━━━ ━━━  ",
        (false, true) => "━━━ ━━━ ×",
    }
}

pub fn render_today(today: &TodayInfo) -> Vec<String> {
    let g = &today.gan_zhi;
    let mut lines = vec![
        format!("  {} {} {}", today.solar.date, today.solar.weekday, today.lunar.full_date),
        format!("  {}年 {}月 {}日 {}时  生肖 {}", g.year, g.month, g.day, g.hour, today.zodiac),
    ];
    if let Some(jie_qi) = &today.jie_qi {
        lines.push(format!("  节气 {jie_qi}"));
    }
    if !today.yi.is_empty() {
        lines.push(format!("  宜 {}", today.yi.join(" ")));
    }
    if !today.ji.is_empty() {
        lines.push(format!("  忌 {}", today.ji.join(" ")));
    }
    lines
}

pub fn render_converted(date: &ConvertedDate) -> Vec<String> {
    match date {
        ConvertedDate::Lunar(lunar) => {
            let mut lines = vec![
                format!("  {} -> {}", lunar.solar_date, lunar.lunar_date_cn),
                format!(
                    "  {}年 {}月 {}日  生肖 {}",
                    lunar.year_gan_zhi, lunar.month_gan_zhi, lunar.day_gan_zhi, lunar.zodiac
                ),
            ];
            if !lunar.festivals.is_empty() {
                lines.push(format!("  {}", lunar.festivals.join(" ")));
            }
            lines
        }
        ConvertedDate::Solar(solar) => {
            vec![format!("  -> {} {}", solar.solar_date, solar.weekday_cn)]
        }
    }
}

/// Service correction next to the local longitude-only estimate
pub fn render_correction(correction: &SolarCorrection, local_offset_minutes: f64) -> Vec<String> {
    vec![
        format!(
            "  {} -> {}",
            correction.original_time, correction.true_solar_time
        ),
        format!(
            "  longitude {:+.1} min, equation of time {:+.1} min, total {:+.1} min",
            correction.longitude_correction_minutes,
            correction.eot_correction_minutes,
            correction.total_correction_minutes
        ),
        format!("  local longitude estimate {local_offset_minutes:+.1} min"),
    ]
}

pub fn render_error(error: &DivinationError) -> String {
    match error {
        DivinationError::Busy => format!("! {error} (type cancel to abandon it)"),
        _ if error.is_retryable() => format!("! {error} (type retry to try again)"),
        _ => format!("! {error}"),
    }
}
