//! Mock implementations for testing
//!
//! These mocks enable integration testing of the runtime without real I/O.

use super::traits::SessionStorage;
use super::{SessionHandle, SessionRuntime, SessionUpdate};
use crate::conversation::{ConversationLog, Message};
use crate::gateway::testing::MockGateway;
use crate::session::{Session, SessionContext, Step};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// In-Memory Storage
// ============================================================================

#[derive(Default)]
pub struct InMemoryStorage {
    sessions: Mutex<HashMap<String, Session>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    async fn save_session(&self, session_id: &str, session: &Session) -> Result<(), String> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), session.clone());
        Ok(())
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), String> {
        self.messages
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

pub struct TestRuntime {
    pub handle: SessionHandle,
    pub storage: Arc<InMemoryStorage>,
    pub gateway: Arc<MockGateway>,
    pub updates: broadcast::Receiver<SessionUpdate>,
}

impl TestRuntime {
    pub fn new(gateway: MockGateway) -> Self {
        Self::with_session(gateway, Session::default())
    }

    pub fn with_session(gateway: MockGateway, session: Session) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let gateway = Arc::new(gateway);
        let handle = SessionRuntime::spawn(
            SessionContext::new("test-session"),
            session,
            ConversationLog::new(),
            storage.clone(),
            gateway.clone(),
        );
        let updates = handle.subscribe();
        Self {
            handle,
            storage,
            gateway,
            updates,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.storage.messages("test-session")
    }

    /// Wait for a state change to the given step with no call in flight
    pub async fn wait_for_settled(&mut self, step: Step, timeout: Duration) -> bool {
        self.wait_for(timeout, |update| {
            matches!(update, SessionUpdate::StateChange { step: s, busy: false } if *s == step)
        })
        .await
    }

    pub async fn wait_for_error(&mut self, timeout: Duration) -> Option<SessionUpdate> {
        let mut found = None;
        self.wait_for(timeout, |update| {
            let hit = matches!(update, SessionUpdate::Error(_));
            if hit {
                found = Some(update.clone());
            }
            hit
        })
        .await;
        found
    }

    async fn wait_for(
        &mut self,
        timeout: Duration,
        mut predicate: impl FnMut(&SessionUpdate) -> bool,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.updates.recv()).await {
                Ok(Ok(update)) if predicate(&update) => return true,
                Ok(Ok(_) | Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, WidgetKind};
    use crate::domain::fixtures::{basic_chart, hexagram};
    use crate::domain::{BirthData, Gender, Location};
    use crate::error::DivinationError;
    use crate::gateway::GatewayError;
    use crate::session::{Event, Intent, Method};
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(2);

    fn birth() -> BirthData {
        BirthData {
            year: 1990,
            month: 5,
            day: 15,
            hour: 14,
            minute: Some(30),
            gender: Gender::Female,
        }
    }

    fn shanghai() -> Location {
        Location {
            city: "上海".to_string(),
            longitude: 121.47,
            latitude: 31.23,
        }
    }

    async fn walk_to_location(rt: &TestRuntime) {
        for event in [
            Event::Begin,
            Event::ChooseIntent(Intent::Career),
            Event::ChooseMethod(Method::Bazi),
            Event::SubmitBirth(birth()),
        ] {
            rt.handle.submit(event).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        storage.save_session("s", &Session::default()).await.unwrap();
        assert_eq!(storage.session("s"), Some(Session::default()));
        assert!(storage.messages("s").is_empty());
    }

    #[tokio::test]
    async fn test_bazi_flow_reaches_result() {
        let gateway = MockGateway::new();
        gateway.queue_response(basic_chart());
        let mut rt = TestRuntime::new(gateway);

        walk_to_location(&rt).await;
        rt.handle.submit(Event::SubmitLocation(shanghai())).await.unwrap();
        assert!(rt.wait_for_settled(Step::Result, WAIT).await);

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert!(snapshot.bazi_result().is_some());
        assert_eq!(rt.storage.session("test-session"), Some(snapshot));

        let calls = rt.gateway.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].endpoint, "divination/bazi");
        assert_eq!(calls[0].body["longitude"], json!(121.47));

        let messages = rt.messages();
        assert!(messages.iter().any(|m| m.role == Role::User));
        let log = ConversationLog::from_messages(messages);
        assert!(log.latest_widget_of_type(WidgetKind::BaziChart).is_some());
        assert!(log.latest_widget_of_type(WidgetKind::BirthDateForm).is_some());
    }

    #[tokio::test]
    async fn test_second_call_while_pending_is_busy() {
        let gateway = MockGateway::with_delay(Duration::from_millis(300));
        gateway.queue_response(basic_chart());
        let mut rt = TestRuntime::new(gateway);

        walk_to_location(&rt).await;
        rt.handle.submit(Event::SubmitLocation(shanghai())).await.unwrap();

        let err = rt.handle.submit(Event::RetryCalculation).await.unwrap_err();
        assert_eq!(err, DivinationError::Busy);

        assert!(rt.wait_for_settled(Step::Result, WAIT).await);
        assert_eq!(rt.gateway.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_late_response() {
        let gateway = MockGateway::with_delay(Duration::from_millis(200));
        gateway.queue_response(basic_chart());
        let started = gateway.call_started.clone();
        let rt = TestRuntime::new(gateway);

        walk_to_location(&rt).await;
        rt.handle.submit(Event::SubmitLocation(shanghai())).await.unwrap();
        started.notified().await;
        rt.handle.submit(Event::Cancel).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.step, Step::Ritual);
        assert!(snapshot.result.is_none());
        assert!(!snapshot.is_busy());
    }

    #[tokio::test]
    async fn test_malformed_response_reports_and_stays() {
        let gateway = MockGateway::new();
        gateway.queue_response(json!({ "chart": { "day_master": {} } }));
        let mut rt = TestRuntime::new(gateway);

        walk_to_location(&rt).await;
        rt.handle.submit(Event::SubmitLocation(shanghai())).await.unwrap();

        let update = rt.wait_for_error(WAIT).await;
        assert!(matches!(
            update,
            Some(SessionUpdate::Error(DivinationError::MalformedResponse(_)))
        ));
        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.step, Step::Ritual);
        assert!(snapshot.result.is_none());
    }

    #[tokio::test]
    async fn test_gateway_failure_then_retry() {
        let gateway = MockGateway::new();
        gateway.queue_error(GatewayError::timeout("Request timeout"));
        gateway.queue_response(basic_chart());
        let mut rt = TestRuntime::new(gateway);

        walk_to_location(&rt).await;
        rt.handle.submit(Event::SubmitLocation(shanghai())).await.unwrap();
        assert!(rt.wait_for_settled(Step::Ritual, WAIT).await);

        rt.handle.submit(Event::RetryCalculation).await.unwrap();
        assert!(rt.wait_for_settled(Step::Result, WAIT).await);
        assert_eq!(rt.gateway.recorded_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_liuyao_flow_and_reset() {
        let gateway = MockGateway::new();
        gateway.queue_response(hexagram());
        let mut rt = TestRuntime::new(gateway);

        for event in [
            Event::Begin,
            Event::ChooseIntent(Intent::Fortune),
            Event::ChooseMethod(Method::Liuyao),
            Event::FinishCalm,
            Event::SubmitTosses {
                question: "事业前景如何".to_string(),
                tosses: vec![7, 9, 7, 7, 8, 9],
            },
        ] {
            rt.handle.submit(event).await.unwrap();
        }
        assert!(rt.wait_for_settled(Step::LiuyaoResult, WAIT).await);
        let before = rt.handle.snapshot().await.unwrap();

        rt.handle.submit(Event::Reset).await.unwrap();
        let after = rt.handle.snapshot().await.unwrap();
        assert_eq!(after.step, Step::Greeting);
        assert!(after.result.is_none());
        assert!(after.sequence > before.sequence);
    }

    #[tokio::test]
    async fn test_refused_event_is_returned() {
        let rt = TestRuntime::new(MockGateway::new());
        let err = rt.handle.submit(Event::FinishCalm).await.unwrap_err();
        assert!(matches!(err, DivinationError::Validation(_)));
        assert_eq!(rt.handle.snapshot().await.unwrap().step, Step::Greeting);
    }
}
