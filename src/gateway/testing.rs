//! Mock gateway for testing
//!
//! Returns queued bodies in order and records every call it receives.

use super::{DivinationGateway, GatewayError};
use crate::domain::{
    BaziRequest, CalendarConvertRequest, LiuyaoInterpretRequest, LiuyaoRequest, TrueSolarTimeRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: &'static str,
    pub body: Value,
}

pub struct MockGateway {
    responses: Mutex<VecDeque<Result<Value, GatewayError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
    /// Notified when a call starts (for test synchronization)
    pub call_started: Arc<Notify>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
            call_started: Arc::new(Notify::new()),
        }
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn queue_response(&self, body: Value) {
        self.responses.lock().unwrap().push_back(Ok(body));
    }

    pub fn queue_error(&self, error: GatewayError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond<B: Serialize + Sync>(&self, endpoint: &'static str, body: &B) -> Result<Value, GatewayError> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint,
            body: serde_json::to_value(body).unwrap(),
        });
        self.call_started.notify_one();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::network("No mock response queued")))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DivinationGateway for MockGateway {
    async fn bazi_chart(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.respond("divination/bazi", request).await
    }

    async fn bazi_interpretation(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.respond("divination/bazi/ai", request).await
    }

    async fn analyze_year(&self, request: &BaziRequest, year: i32) -> Result<Value, GatewayError> {
        let mut body = serde_json::to_value(request).unwrap();
        body["year"] = json!(year);
        self.respond("divination/bazi/analyze-year", &body).await
    }

    async fn liuyao_chart(&self, request: &LiuyaoRequest) -> Result<Value, GatewayError> {
        self.respond("divination/liuyao", request).await
    }

    async fn liuyao_interpretation(
        &self,
        request: &LiuyaoInterpretRequest,
    ) -> Result<Value, GatewayError> {
        self.respond("divination/liuyao/ai-interpret", request).await
    }

    async fn convert_calendar(&self, request: &CalendarConvertRequest) -> Result<Value, GatewayError> {
        self.respond("calendar/convert", request).await
    }

    async fn today(&self) -> Result<Value, GatewayError> {
        self.respond("calendar/today", &Value::Null).await
    }

    async fn true_solar_time(&self, request: &TrueSolarTimeRequest) -> Result<Value, GatewayError> {
        self.respond("calendar/true-solar-time", request).await
    }
}
