//! Remote calculation gateway
//!
//! The gateway is a raw JSON transport: every operation returns the 2xx body
//! untouched and leaves structural validation to `crate::domain`.

mod error;
mod http;
#[cfg(test)]
pub mod testing;

pub use error::GatewayError;
#[cfg(test)]
pub use error::GatewayErrorKind;
pub use http::HttpGateway;

use crate::domain::{
    BaziRequest, CalendarConvertRequest, LiuyaoInterpretRequest, LiuyaoRequest, TrueSolarTimeRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// One operation per divination capability
#[async_trait]
pub trait DivinationGateway: Send + Sync {
    /// `POST /divination/bazi`
    async fn bazi_chart(&self, request: &BaziRequest) -> Result<Value, GatewayError>;

    /// `POST /divination/bazi/ai`
    async fn bazi_interpretation(&self, request: &BaziRequest) -> Result<Value, GatewayError>;

    /// `POST /divination/bazi/analyze-year?year=`
    async fn analyze_year(&self, request: &BaziRequest, year: i32) -> Result<Value, GatewayError>;

    /// `POST /divination/liuyao`
    async fn liuyao_chart(&self, request: &LiuyaoRequest) -> Result<Value, GatewayError>;

    /// `POST /divination/liuyao/ai-interpret`
    async fn liuyao_interpretation(
        &self,
        request: &LiuyaoInterpretRequest,
    ) -> Result<Value, GatewayError>;

    /// `POST /calendar/convert`
    async fn convert_calendar(&self, request: &CalendarConvertRequest) -> Result<Value, GatewayError>;

    /// `GET /calendar/today`
    async fn today(&self) -> Result<Value, GatewayError>;

    /// `POST /calendar/true-solar-time`
    async fn true_solar_time(&self, request: &TrueSolarTimeRequest) -> Result<Value, GatewayError>;
}

#[async_trait]
impl<T: DivinationGateway + ?Sized> DivinationGateway for Arc<T> {
    async fn bazi_chart(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        (**self).bazi_chart(request).await
    }

    async fn bazi_interpretation(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        (**self).bazi_interpretation(request).await
    }

    async fn analyze_year(&self, request: &BaziRequest, year: i32) -> Result<Value, GatewayError> {
        (**self).analyze_year(request, year).await
    }

    async fn liuyao_chart(&self, request: &LiuyaoRequest) -> Result<Value, GatewayError> {
        (**self).liuyao_chart(request).await
    }

    async fn liuyao_interpretation(
        &self,
        request: &LiuyaoInterpretRequest,
    ) -> Result<Value, GatewayError> {
        (**self).liuyao_interpretation(request).await
    }

    async fn convert_calendar(&self, request: &CalendarConvertRequest) -> Result<Value, GatewayError> {
        (**self).convert_calendar(request).await
    }

    async fn today(&self) -> Result<Value, GatewayError> {
        (**self).today().await
    }

    async fn true_solar_time(&self, request: &TrueSolarTimeRequest) -> Result<Value, GatewayError> {
        (**self).true_solar_time(request).await
    }
}

// ============================================================================
// Session-bound calls
// ============================================================================

/// What a pending call will produce, kept in the session while in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallKind {
    BaziChart,
    BaziInterpretation,
    YearAnalysis { year: i32 },
    LiuyaoChart,
    LiuyaoInterpretation,
}

/// A gateway call issued on behalf of a session
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    BaziChart(BaziRequest),
    BaziInterpretation(BaziRequest),
    YearAnalysis { request: BaziRequest, year: i32 },
    LiuyaoChart(LiuyaoRequest),
    LiuyaoInterpretation(LiuyaoInterpretRequest),
}

impl GatewayCall {
    pub fn kind(&self) -> CallKind {
        match self {
            GatewayCall::BaziChart(_) => CallKind::BaziChart,
            GatewayCall::BaziInterpretation(_) => CallKind::BaziInterpretation,
            GatewayCall::YearAnalysis { year, .. } => CallKind::YearAnalysis { year: *year },
            GatewayCall::LiuyaoChart(_) => CallKind::LiuyaoChart,
            GatewayCall::LiuyaoInterpretation(_) => CallKind::LiuyaoInterpretation,
        }
    }

    pub async fn dispatch<G: DivinationGateway + ?Sized>(&self, gateway: &G) -> Result<Value, GatewayError> {
        match self {
            GatewayCall::BaziChart(request) => gateway.bazi_chart(request).await,
            GatewayCall::BaziInterpretation(request) => gateway.bazi_interpretation(request).await,
            GatewayCall::YearAnalysis { request, year } => gateway.analyze_year(request, *year).await,
            GatewayCall::LiuyaoChart(request) => gateway.liuyao_chart(request).await,
            GatewayCall::LiuyaoInterpretation(request) => {
                gateway.liuyao_interpretation(request).await
            }
        }
    }
}

// ============================================================================
// Logging wrapper
// ============================================================================

/// Logging wrapper for gateways
pub struct LoggingGateway {
    inner: Arc<dyn DivinationGateway>,
}

impl LoggingGateway {
    pub fn new(inner: Arc<dyn DivinationGateway>) -> Self {
        Self { inner }
    }

    async fn timed<F>(&self, endpoint: &'static str, call: F) -> Result<Value, GatewayError>
    where
        F: Future<Output = Result<Value, GatewayError>> + Send,
    {
        let start = Instant::now();
        let result = call.await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    endpoint,
                    duration_ms = %duration.as_millis(),
                    "Gateway call completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    endpoint,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    status = ?e.status,
                    error = %e.message,
                    transient = e.kind.is_transient(),
                    "Gateway call failed"
                );
            }
        }

        result
    }
}

#[async_trait]
impl DivinationGateway for LoggingGateway {
    async fn bazi_chart(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.timed("divination/bazi", self.inner.bazi_chart(request)).await
    }

    async fn bazi_interpretation(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.timed("divination/bazi/ai", self.inner.bazi_interpretation(request))
            .await
    }

    async fn analyze_year(&self, request: &BaziRequest, year: i32) -> Result<Value, GatewayError> {
        self.timed(
            "divination/bazi/analyze-year",
            self.inner.analyze_year(request, year),
        )
        .await
    }

    async fn liuyao_chart(&self, request: &LiuyaoRequest) -> Result<Value, GatewayError> {
        self.timed("divination/liuyao", self.inner.liuyao_chart(request)).await
    }

    async fn liuyao_interpretation(
        &self,
        request: &LiuyaoInterpretRequest,
    ) -> Result<Value, GatewayError> {
        self.timed(
            "divination/liuyao/ai-interpret",
            self.inner.liuyao_interpretation(request),
        )
        .await
    }

    async fn convert_calendar(&self, request: &CalendarConvertRequest) -> Result<Value, GatewayError> {
        self.timed("calendar/convert", self.inner.convert_calendar(request))
            .await
    }

    async fn today(&self) -> Result<Value, GatewayError> {
        self.timed("calendar/today", self.inner.today()).await
    }

    async fn true_solar_time(&self, request: &TrueSolarTimeRequest) -> Result<Value, GatewayError> {
        self.timed("calendar/true-solar-time", self.inner.true_solar_time(request))
            .await
    }
}
