//! HTTP+JSON implementation of the calculation gateway

use super::{DivinationGateway, GatewayError};
use crate::config::ClientConfig;
use crate::domain::{
    BaziRequest, CalendarConvertRequest, LiuyaoInterpretRequest, LiuyaoRequest, TrueSolarTimeRequest,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// Gateway backed by the FastAPI service at `{base}/divination/*` and `{base}/calendar/*`
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        query: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let builder = self.client.post(self.url(path)).query(query).json(body);
        self.send(builder).await
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::timeout(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                GatewayError::network(format!("Connection failed: {e}"))
            } else {
                GatewayError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        // A non-JSON 2xx body is handed on as a string so the response
        // validators reject it as malformed.
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Map a non-2xx answer to an error. Only the message is taken from the body.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> GatewayError {
    let message = error_detail(body);
    let err = match status.as_u16() {
        400 | 422 => GatewayError::invalid_request(format!("Invalid request: {message}")),
        404 => GatewayError::not_found(format!("Not found: {message}")),
        408 | 504 => GatewayError::timeout(format!("Gateway timeout: {message}")),
        500..=599 => GatewayError::server_error(format!("Server error: {message}")),
        _ => GatewayError::unknown(format!("HTTP {status}: {message}")),
    };
    err.with_status(status.as_u16())
}

/// FastAPI puts the message in `detail`: a string, or a list of `{msg}` entries
/// for request validation failures.
fn error_detail(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    match parsed.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl DivinationGateway for HttpGateway {
    async fn bazi_chart(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.post("/divination/bazi", request, &[]).await
    }

    async fn bazi_interpretation(&self, request: &BaziRequest) -> Result<Value, GatewayError> {
        self.post("/divination/bazi/ai", request, &[]).await
    }

    async fn analyze_year(&self, request: &BaziRequest, year: i32) -> Result<Value, GatewayError> {
        self.post("/divination/bazi/analyze-year", request, &[("year", year.to_string())])
            .await
    }

    async fn liuyao_chart(&self, request: &LiuyaoRequest) -> Result<Value, GatewayError> {
        self.post("/divination/liuyao", request, &[]).await
    }

    async fn liuyao_interpretation(
        &self,
        request: &LiuyaoInterpretRequest,
    ) -> Result<Value, GatewayError> {
        self.post("/divination/liuyao/ai-interpret", request, &[]).await
    }

    async fn convert_calendar(&self, request: &CalendarConvertRequest) -> Result<Value, GatewayError> {
        self.post("/calendar/convert", request, &[]).await
    }

    async fn today(&self) -> Result<Value, GatewayError> {
        self.get("/calendar/today").await
    }

    async fn true_solar_time(&self, request: &TrueSolarTimeRequest) -> Result<Value, GatewayError> {
        self.post("/calendar/true-solar-time", request, &[]).await
    }
}
