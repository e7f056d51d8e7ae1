//! BaZi (four pillars) request and chart contracts
//!
//! The service answers with one of two shapes: the basic chart, and an
//! extended one that also carries the strength / useful-god / pattern
//! analyses. Both are the same `BaziResponse` with the analysis group
//! optional as a whole.

use super::{decode, field, require, SolarCorrection};
use crate::error::{DivinationError, DivinationResult};
use crate::session::{Session, SessionContext};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_BIRTH_YEAR: i32 = 1900;
pub const MAX_BIRTH_YEAR: i32 = 2100;

// ============================================================================
// Collected input
// ============================================================================

/// Closed binary gender tag; the service encodes it as 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Gender {
    Female,
    Male,
}

impl From<Gender> for u8 {
    fn from(gender: Gender) -> Self {
        match gender {
            Gender::Female => 0,
            Gender::Male => 1,
        }
    }
}

impl TryFrom<u8> for Gender {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Gender::Female),
            1 => Ok(Gender::Male),
            other => Err(format!("gender must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => write!(f, "female"),
            Gender::Male => write!(f, "male"),
        }
    }
}

/// Birth data collected during `collect-birth`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthData {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// Absent when the user only knows the hour
    #[serde(default)]
    pub minute: Option<u32>,
    pub gender: Gender,
}

impl BirthData {
    /// Check every field against the ranges the service accepts
    pub fn validate(&self) -> DivinationResult<()> {
        if !(MIN_BIRTH_YEAR..=MAX_BIRTH_YEAR).contains(&self.year) {
            return Err(DivinationError::validation(format!(
                "birth year {} outside {MIN_BIRTH_YEAR}-{MAX_BIRTH_YEAR}",
                self.year
            )));
        }
        if NaiveDate::from_ymd_opt(self.year, self.month, self.day).is_none() {
            return Err(DivinationError::validation(format!(
                "{}-{:02}-{:02} is not a calendar date",
                self.year, self.month, self.day
            )));
        }
        if self.hour > 23 {
            return Err(DivinationError::validation(format!("hour {} outside 0-23", self.hour)));
        }
        if let Some(minute) = self.minute {
            if minute > 59 {
                return Err(DivinationError::validation(format!("minute {minute} outside 0-59")));
            }
        }
        Ok(())
    }
}

/// Birth place collected during `collect-location`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    pub fn validate(&self) -> DivinationResult<()> {
        if self.city.trim().is_empty() {
            return Err(DivinationError::validation("city is empty"));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DivinationError::validation(format!(
                "longitude {} outside -180..180",
                self.longitude
            )));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DivinationError::validation(format!(
                "latitude {} outside -90..90",
                self.latitude
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Request
// ============================================================================

/// Body of `/divination/bazi`, `/divination/bazi/ai` and `/divination/bazi/analyze-year`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaziRequest {
    pub birth_year: i32,
    pub birth_month: u32,
    pub birth_day: u32,
    pub birth_hour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_true_solar_time: Option<bool>,
}

/// Build the chart request from the session's collected data.
///
/// Correction is requested whenever the context enables it, and then the
/// location must be present.
pub fn build_bazi_request(session: &Session, ctx: &SessionContext) -> DivinationResult<BaziRequest> {
    let birth = session
        .birth
        .as_ref()
        .ok_or_else(|| DivinationError::incomplete("birth information has not been collected"))?;

    let correct = ctx.use_true_solar_time;
    if correct && session.location.is_none() {
        return Err(DivinationError::validation(
            "true solar time correction requires a birth location",
        ));
    }

    Ok(BaziRequest {
        birth_year: birth.year,
        birth_month: birth.month,
        birth_day: birth.day,
        birth_hour: birth.hour,
        birth_minute: Some(birth.minute.unwrap_or(0)),
        longitude: session.location.as_ref().map(|l| l.longitude),
        latitude: session.location.as_ref().map(|l| l.latitude),
        gender: birth.gender,
        use_true_solar_time: Some(correct),
    })
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pillar {
    pub position: String,
    #[serde(default)]
    pub position_cn: String,
    pub gan: String,
    pub zhi: String,
    pub gan_zhi: String,
    pub gan_element: String,
    pub zhi_element: String,
    pub gan_yinyang: String,
    #[serde(default)]
    pub ten_god: String,
    #[serde(default)]
    pub hidden_stems: Vec<String>,
    pub nayin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayMaster {
    pub gan: String,
    pub element: String,
    pub yinyang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthSummary {
    pub solar_date: String,
    #[serde(default)]
    pub true_solar_time: Option<String>,
    pub lunar_date: String,
    pub longitude: f64,
    pub latitude: f64,
    pub gender: String,
    #[serde(default)]
    pub solar_correction: Option<SolarCorrection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub pillars: Vec<Pillar>,
    pub day_master: DayMaster,
    /// Element name -> occurrences across stems and branches
    #[serde(default)]
    pub elements_count: BTreeMap<String, u32>,
}

/// One year inside a luck cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiuNian {
    pub year: i32,
    pub age: i32,
    pub gan_zhi: String,
    #[serde(default)]
    pub ten_god: String,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LuckCycle {
    pub index: u32,
    pub start_age: i32,
    pub end_age: i32,
    pub start_year: i32,
    pub end_year: i32,
    pub gan_zhi: String,
    #[serde(default)]
    pub years: Vec<LiuNian>,
}

impl LuckCycle {
    pub fn contains_year(&self, year: i32) -> bool {
        (self.start_year..=self.end_year).contains(&year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    pub zodiac: String,
    pub constellation: String,
    #[serde(default)]
    pub current_jieqi: Option<String>,
    #[serde(default)]
    pub next_jieqi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetail {
    pub score: f64,
    pub level: String,
    pub level_desc: String,
    #[serde(default)]
    pub details: Vec<String>,
    pub day_element: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsefulGods {
    #[serde(default)]
    pub xi_shen: Vec<String>,
    #[serde(default)]
    pub yong_shen: Option<String>,
    #[serde(default)]
    pub ji_shen: Vec<String>,
    #[serde(default)]
    pub xian_shen: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiao_hou: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tong_guan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub revealed: bool,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    #[serde(default)]
    pub main_pattern: Option<PatternInfo>,
    #[serde(default)]
    pub all_patterns: Vec<PatternInfo>,
    pub strength_level: String,
}

/// Borrowed view of the analysis group, only handed out when all parts exist
#[derive(Debug, Clone, Copy)]
pub struct ChartAnalysis<'a> {
    pub strength: &'a AnalysisDetail,
    pub useful_gods: &'a UsefulGods,
    pub pattern: &'a PatternAnalysis,
}

/// Chart returned by `/divination/bazi`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaziResponse {
    pub birth_info: BirthSummary,
    pub chart: ChartInfo,
    #[serde(default)]
    pub luck_cycles: Vec<LuckCycle>,
    #[serde(default)]
    pub additional_info: Option<AdditionalInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength_analysis: Option<AnalysisDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub useful_gods: Option<UsefulGods>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_analysis: Option<PatternAnalysis>,
}

impl BaziResponse {
    pub fn analysis(&self) -> Option<ChartAnalysis<'_>> {
        Some(ChartAnalysis {
            strength: self.strength_analysis.as_ref()?,
            useful_gods: self.useful_gods.as_ref()?,
            pattern: self.pattern_analysis.as_ref()?,
        })
    }

    /// The four stem-branch pairs, year pillar first
    pub fn gan_zhi(&self) -> Vec<&str> {
        self.chart.pillars.iter().map(|p| p.gan_zhi.as_str()).collect()
    }

    pub fn luck_cycle_for_year(&self, year: i32) -> Option<&LuckCycle> {
        self.luck_cycles.iter().find(|c| c.contains_year(year))
    }
}

const ANALYSIS_GROUP: [&str; 3] = ["strength_analysis", "useful_gods", "pattern_analysis"];

/// The analysis fields travel together: all present or all absent.
fn check_analysis_group(body: &Value) -> DivinationResult<()> {
    let present: Vec<&str> = ANALYSIS_GROUP
        .iter()
        .copied()
        .filter(|key| field(body, &[key]).is_some())
        .collect();
    if present.is_empty() || present.len() == ANALYSIS_GROUP.len() {
        Ok(())
    } else {
        Err(DivinationError::malformed(format!(
            "partial analysis group: only {} present",
            present.join(", ")
        )))
    }
}

/// Structural check for both chart shapes, then typed decode
pub fn validate_bazi_response(body: Value) -> DivinationResult<BaziResponse> {
    if !body.is_object() {
        return Err(DivinationError::malformed("chart body is not an object"));
    }
    require(&body, &["chart", "pillars"])?;
    require(&body, &["chart", "day_master"])?;
    check_analysis_group(&body)?;

    let response: BaziResponse = decode(body, "bazi chart")?;
    if response.chart.pillars.len() != 4 {
        return Err(DivinationError::malformed(format!(
            "expected 4 pillars, got {}",
            response.chart.pillars.len()
        )));
    }
    Ok(response)
}

/// Payload of `/divination/bazi/ai`: narrative text plus the analysis group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaziInterpretation {
    pub content: String,
    #[serde(default)]
    pub strength_analysis: Option<AnalysisDetail>,
    #[serde(default)]
    pub useful_gods: Option<UsefulGods>,
    #[serde(default)]
    pub pattern_analysis: Option<PatternAnalysis>,
}

pub fn validate_bazi_interpretation(body: Value) -> DivinationResult<BaziInterpretation> {
    super::check_success(&body)?;
    require(&body, &["content"])?;
    check_analysis_group(&body)?;
    decode(body, "bazi interpretation")
}
