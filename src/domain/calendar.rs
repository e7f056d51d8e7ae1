//! Calendar utility contracts (lunar conversion, today, true solar time)

use super::bazi::{BirthData, Location, MAX_BIRTH_YEAR, MIN_BIRTH_YEAR};
use crate::error::{DivinationError, DivinationResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarKind {
    Solar,
    Lunar,
}

/// Body of `/calendar/convert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConvertRequest {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub source_type: CalendarKind,
    #[serde(default)]
    pub is_leap_month: bool,
}

impl CalendarConvertRequest {
    pub fn solar(year: i32, month: u32, day: u32) -> DivinationResult<Self> {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(DivinationError::validation(format!(
                "{year}-{month:02}-{day:02} is not a calendar date"
            )));
        }
        Self::checked(year, month, day, CalendarKind::Solar, false)
    }

    /// Lunar months have at most 30 days; a leap month repeats the month number.
    pub fn lunar(year: i32, month: u32, day: u32, is_leap_month: bool) -> DivinationResult<Self> {
        if !(1..=30).contains(&day) {
            return Err(DivinationError::validation(format!("lunar day {day} outside 1-30")));
        }
        Self::checked(year, month, day, CalendarKind::Lunar, is_leap_month)
    }

    fn checked(
        year: i32,
        month: u32,
        day: u32,
        source_type: CalendarKind,
        is_leap_month: bool,
    ) -> DivinationResult<Self> {
        if !(MIN_BIRTH_YEAR..=MAX_BIRTH_YEAR).contains(&year) {
            return Err(DivinationError::validation(format!(
                "year {year} outside {MIN_BIRTH_YEAR}-{MAX_BIRTH_YEAR}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(DivinationError::validation(format!("month {month} outside 1-12")));
        }
        Ok(Self {
            year,
            month,
            day,
            source_type,
            is_leap_month,
        })
    }
}

/// Solar date converted to the lunar calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LunarDate {
    pub solar_date: String,
    pub lunar_year: i32,
    /// Negative for a leap month
    pub lunar_month: i32,
    pub lunar_day: u32,
    pub lunar_date_cn: String,
    #[serde(default)]
    pub is_leap_month: bool,
    pub year_gan_zhi: String,
    pub month_gan_zhi: String,
    pub day_gan_zhi: String,
    pub zodiac: String,
    #[serde(default)]
    pub jie_qi: Option<String>,
    #[serde(default)]
    pub festivals: Vec<String>,
}

/// Lunar date converted to the solar calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarDate {
    pub solar_year: i32,
    pub solar_month: u32,
    pub solar_day: u32,
    pub solar_date: String,
    #[serde(default)]
    pub weekday: u8,
    #[serde(default)]
    pub weekday_cn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConvertedDate {
    Lunar(LunarDate),
    Solar(SolarDate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodaySolar {
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub weekday: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayLunar {
    pub full_date: String,
    #[serde(default)]
    pub year_cn: String,
    #[serde(default)]
    pub month_cn: String,
    #[serde(default)]
    pub day_cn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanZhiSet {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PengZu {
    pub gan: String,
    pub zhi: String,
}

/// Payload of `GET /calendar/today`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayInfo {
    pub solar: TodaySolar,
    pub lunar: TodayLunar,
    pub gan_zhi: GanZhiSet,
    pub zodiac: String,
    #[serde(default)]
    pub jie_qi: Option<String>,
    /// Activities favoured today
    #[serde(default)]
    pub yi: Vec<String>,
    /// Activities to avoid today
    #[serde(default)]
    pub ji: Vec<String>,
    #[serde(default)]
    pub peng_zu: Option<PengZu>,
}

/// Body of `/calendar/true-solar-time`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueSolarTimeRequest {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub longitude: f64,
}

impl TrueSolarTimeRequest {
    pub fn for_birth(birth: &BirthData, location: &Location) -> DivinationResult<Self> {
        birth.validate()?;
        location.validate()?;
        Ok(Self {
            year: birth.year,
            month: birth.month,
            day: birth.day,
            hour: birth.hour,
            minute: birth.minute.unwrap_or(0),
            longitude: location.longitude,
        })
    }
}

/// Breakdown of a true-solar-time correction, in minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarCorrection {
    pub original_time: String,
    pub true_solar_time: String,
    pub longitude: f64,
    pub longitude_correction_minutes: f64,
    pub eot_correction_minutes: f64,
    pub total_correction_minutes: f64,
}

/// Longitude term of the correction: four minutes per degree from the meridian.
/// The equation-of-time term is left to the service.
pub fn longitude_offset_minutes(longitude: f64, standard_meridian: f64) -> f64 {
    (longitude - standard_meridian) * 4.0
}
