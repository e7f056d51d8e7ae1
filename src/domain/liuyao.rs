//! Six-line (Liuyao) coin divination contracts

use super::{decode, require};
use crate::error::{DivinationError, DivinationResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const LINE_COUNT: usize = 6;

/// Outcome of one throw of three coins (heads 3, tails 2, summed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CoinToss {
    /// 6: three tails, moving yin
    OldYin,
    /// 7: one head, still yang
    YoungYang,
    /// 8: two heads, still yin
    YoungYin,
    /// 9: three heads, moving yang
    OldYang,
}

impl CoinToss {
    pub const ALL: [CoinToss; 4] = [
        CoinToss::OldYin,
        CoinToss::YoungYang,
        CoinToss::YoungYin,
        CoinToss::OldYang,
    ];

    pub fn value(self) -> u8 {
        match self {
            CoinToss::OldYin => 6,
            CoinToss::YoungYang => 7,
            CoinToss::YoungYin => 8,
            CoinToss::OldYang => 9,
        }
    }

    pub fn is_yang(self) -> bool {
        matches!(self, CoinToss::YoungYang | CoinToss::OldYang)
    }

    /// Moving lines flip polarity in the transformed hexagram
    pub fn is_moving(self) -> bool {
        matches!(self, CoinToss::OldYin | CoinToss::OldYang)
    }

    /// Line bit after transformation: 1 yang, 0 yin
    pub fn changed_bit(self) -> u8 {
        u8::from(self.is_yang() != self.is_moving())
    }

    /// Throw three coins
    pub fn throw<R: Rng>(rng: &mut R) -> Self {
        let sum: u8 = (0..3).map(|_| if rng.gen_bool(0.5) { 3 } else { 2 }).sum();
        match sum {
            6 => CoinToss::OldYin,
            7 => CoinToss::YoungYang,
            8 => CoinToss::YoungYin,
            _ => CoinToss::OldYang,
        }
    }
}

impl From<CoinToss> for u8 {
    fn from(toss: CoinToss) -> Self {
        toss.value()
    }
}

impl TryFrom<u8> for CoinToss {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CoinToss::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for CoinToss {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(CoinToss::OldYin),
            7 => Ok(CoinToss::YoungYang),
            8 => Ok(CoinToss::YoungYin),
            9 => Ok(CoinToss::OldYang),
            other => Err(format!("coin toss value {other} is not one of 6, 7, 8, 9")),
        }
    }
}

impl fmt::Display for CoinToss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoinToss::OldYin => "old yin",
            CoinToss::YoungYang => "young yang",
            CoinToss::YoungYin => "young yin",
            CoinToss::OldYang => "old yang",
        };
        write!(f, "{} ({name})", self.value())
    }
}

/// 1-based positions (bottom line first) of the moving lines
pub fn moving_positions(tosses: &[CoinToss]) -> Vec<u8> {
    (1u8..)
        .zip(tosses)
        .filter(|(_, toss)| toss.is_moving())
        .map(|(position, _)| position)
        .collect()
}

/// Six fresh throws, bottom line first
pub fn throw_hexagram<R: Rng>(rng: &mut R) -> [CoinToss; LINE_COUNT] {
    std::array::from_fn(|_| CoinToss::throw(rng))
}

// ============================================================================
// Request
// ============================================================================

/// Body of `/divination/liuyao`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiuyaoRequest {
    pub question: String,
    pub coin_results: [CoinToss; LINE_COUNT],
}

/// Validate raw toss values into a request. Exactly six values from {6,7,8,9}.
pub fn build_liuyao_request(question: &str, coin_results: &[i64]) -> DivinationResult<LiuyaoRequest> {
    if coin_results.len() != LINE_COUNT {
        return Err(DivinationError::invalid_toss(format!(
            "expected {LINE_COUNT} coin tosses, got {}",
            coin_results.len()
        )));
    }
    let mut tosses = [CoinToss::YoungYang; LINE_COUNT];
    for (slot, raw) in tosses.iter_mut().zip(coin_results) {
        *slot = CoinToss::try_from(*raw).map_err(DivinationError::InvalidToss)?;
    }
    Ok(LiuyaoRequest {
        question: question.trim().to_string(),
        coin_results: tosses,
    })
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Yin,
    Yang,
}

/// One line of the cast hexagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yao {
    #[serde(rename = "type")]
    pub polarity: Polarity,
    pub changing: bool,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub value: u8,
    pub position: u8,
    #[serde(default)]
    pub position_name: String,
    pub coin_value: CoinToss,
    #[serde(default)]
    pub beast: String,
    #[serde(default)]
    pub is_world: bool,
    #[serde(default)]
    pub is_response: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hexagram {
    pub name: String,
    #[serde(default)]
    pub upper: String,
    #[serde(default)]
    pub lower: String,
    #[serde(default)]
    pub upper_symbol: String,
    #[serde(default)]
    pub lower_symbol: String,
    #[serde(default)]
    pub lines: Vec<u8>,
}

/// Hexagram returned by `/divination/liuyao`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiuyaoResponse {
    #[serde(default)]
    pub question: String,
    pub coin_results: [CoinToss; LINE_COUNT],
    #[serde(default)]
    pub yaos: Vec<Yao>,
    pub original_hexagram: Hexagram,
    #[serde(default)]
    pub changed_hexagram: Option<Hexagram>,
    #[serde(default)]
    pub moving_positions: Vec<u8>,
    #[serde(default)]
    pub world_position: Option<u8>,
    #[serde(default)]
    pub response_position: Option<u8>,
    #[serde(default)]
    pub interpretation_hint: Option<String>,
    /// Classical text bundle attached by the service; passed back verbatim
    /// when asking for the AI reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Value>,
}

impl LiuyaoResponse {
    pub fn has_moving_lines(&self) -> bool {
        !self.moving_positions.is_empty()
    }
}

pub fn validate_liuyao_response(body: Value) -> DivinationResult<LiuyaoResponse> {
    if !body.is_object() {
        return Err(DivinationError::malformed("hexagram body is not an object"));
    }
    require(&body, &["original_hexagram", "name"])?;
    require(&body, &["coin_results"])?;

    let response: LiuyaoResponse = decode(body, "liuyao hexagram")?;

    if !response.yaos.is_empty() && response.yaos.len() != LINE_COUNT {
        return Err(DivinationError::malformed(format!(
            "expected {LINE_COUNT} lines, got {}",
            response.yaos.len()
        )));
    }
    if response.moving_positions != moving_positions(&response.coin_results) {
        return Err(DivinationError::malformed(
            "moving positions disagree with the coin results",
        ));
    }
    if response.has_moving_lines() != response.changed_hexagram.is_some() {
        return Err(DivinationError::malformed(
            "transformed hexagram must be present exactly when lines move",
        ));
    }
    Ok(response)
}

/// Body of `/divination/liuyao/ai-interpret`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiuyaoInterpretRequest {
    pub question: String,
    pub hexagram_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_hexagram_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moving_positions: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_data: Option<Value>,
}

impl LiuyaoInterpretRequest {
    pub fn from_result(result: &LiuyaoResponse) -> Self {
        Self {
            question: result.question.clone(),
            hexagram_name: result.original_hexagram.name.clone(),
            changed_hexagram_name: result.changed_hexagram.as_ref().map(|h| h.name.clone()),
            moving_positions: result
                .has_moving_lines()
                .then(|| result.moving_positions.clone()),
            interpretation_data: result.interpretation.clone(),
        }
    }
}

/// Name of the hexagram a response describes, for log lines
pub fn hexagram_title(result: &LiuyaoResponse) -> String {
    match &result.changed_hexagram {
        Some(changed) => format!("{} -> {}", result.original_hexagram.name, changed.name),
        None => result.original_hexagram.name.clone(),
    }
}
