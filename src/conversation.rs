//! Conversation log
//!
//! An append-only transcript mirroring the session's progress for display.
//! The log is observational: nothing is ever re-derived from it, the session
//! snapshot is the authority.

use crate::domain::{BaziResponse, CoinToss, LiuyaoResponse};
use crate::session::{Intent, Method};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Widget,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Widget => write!(f, "widget"),
        }
    }
}

/// UI component attached to a message, each carrying its own payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "widget", content = "data", rename_all = "kebab-case")]
pub enum Widget {
    IntentSelector { options: Vec<Intent> },
    MethodSelector { options: Vec<Method> },
    BirthDateForm,
    LocationPicker { use_true_solar_time: bool },
    BreathGuide,
    CoinToss { tosses: Vec<CoinToss> },
    BaziChart(Box<BaziResponse>),
    LiuyaoChart(Box<LiuyaoResponse>),
    Loading { label: String },
}

/// The closed set of widget tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    IntentSelector,
    MethodSelector,
    BirthDateForm,
    LocationPicker,
    BreathGuide,
    CoinToss,
    BaziChart,
    LiuyaoChart,
    Loading,
}

impl Widget {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::IntentSelector { .. } => WidgetKind::IntentSelector,
            Widget::MethodSelector { .. } => WidgetKind::MethodSelector,
            Widget::BirthDateForm => WidgetKind::BirthDateForm,
            Widget::LocationPicker { .. } => WidgetKind::LocationPicker,
            Widget::BreathGuide => WidgetKind::BreathGuide,
            Widget::CoinToss { .. } => WidgetKind::CoinToss,
            Widget::BaziChart(_) => WidgetKind::BaziChart,
            Widget::LiuyaoChart(_) => WidgetKind::LiuyaoChart,
            Widget::Loading { .. } => WidgetKind::Loading,
        }
    }
}

/// Immutable log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    /// May be empty when the widget fully represents the entry
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
}

/// A message before the log has assigned its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub id: Option<u64>,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub widget: Option<Widget>,
}

impl MessageDraft {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            timestamp: None,
            widget: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn widget(widget: Widget) -> Self {
        Self {
            widget: Some(widget),
            ..Self::new(Role::Widget, "")
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, which must already be in id order
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a draft. A supplied id is kept only if it is greater than every
    /// id already in the log, and a supplied timestamp is clamped so time
    /// never runs backwards; otherwise the next value is assigned.
    pub fn append(&mut self, draft: MessageDraft) -> &Message {
        let last = self.messages.last();
        let next_id = last.map_or(1, |m| m.id + 1);
        let floor = last.map(|m| m.timestamp);

        let id = draft.id.filter(|id| *id >= next_id).unwrap_or(next_id);
        let timestamp = draft.timestamp.unwrap_or_else(Utc::now);
        let timestamp = floor.map_or(timestamp, |floor| timestamp.max(floor));

        self.messages.push(Message {
            id,
            role: draft.role,
            content: draft.content,
            timestamp,
            widget: draft.widget,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Most recent entries first, restricted to one widget tag. Lazy.
    pub fn widgets_of_type(&self, kind: WidgetKind) -> impl Iterator<Item = &Message> + '_ {
        self.messages
            .iter()
            .rev()
            .filter(move |m| m.widget.as_ref().is_some_and(|w| w.kind() == kind))
    }

    pub fn latest_widget_of_type(&self, kind: WidgetKind) -> Option<&Message> {
        self.widgets_of_type(kind).next()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
