//! Error-reporting collaborator.
//!
//! Tamper detections are reported as non-fatal messages with structured tags;
//! routine checks leave breadcrumbs. The host application plugs in its crash
//! reporter; [`TracingReporter`] forwards everything to `tracing`.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Severity attached to breadcrumbs and captured messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Trail entry recorded ahead of any captured message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub category: String,
    pub message: String,
    pub level: ReportLevel,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Breadcrumb {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            level: ReportLevel::Info,
            data: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: ReportLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }
}

/// Message captured as a standalone report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedMessage {
    pub message: String,
    pub level: ReportLevel,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl CapturedMessage {
    pub fn new(message: impl Into<String>, level: ReportLevel) -> Self {
        Self {
            message: message.into(),
            level,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.tags.insert(key.into(), value.to_string());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Error-reporting sink. Implementations must never fail the caller.
pub trait ErrorReporter: Send + Sync {
    fn add_breadcrumb(&self, breadcrumb: Breadcrumb);

    fn capture_message(&self, message: CapturedMessage);
}

/// Reporter that forwards to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        debug!(
            category = %breadcrumb.category,
            data = ?breadcrumb.data,
            "{}",
            breadcrumb.message
        );
    }

    fn capture_message(&self, message: CapturedMessage) {
        match message.level {
            ReportLevel::Debug => debug!(tags = ?message.tags, "{}", message.message),
            ReportLevel::Info => info!(tags = ?message.tags, "{}", message.message),
            ReportLevel::Warning => warn!(tags = ?message.tags, "{}", message.message),
            ReportLevel::Error => error!(tags = ?message.tags, "{}", message.message),
        }
    }
}

/// Reporter that keeps everything in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    breadcrumbs: Mutex<Vec<Breadcrumb>>,
    messages: Mutex<Vec<CapturedMessage>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs.lock().clone()
    }

    pub fn messages(&self) -> Vec<CapturedMessage> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.breadcrumbs.lock().clear();
        self.messages.lock().clear();
    }
}

impl ErrorReporter for RecordingReporter {
    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.breadcrumbs.lock().push(breadcrumb);
    }

    fn capture_message(&self, message: CapturedMessage) {
        self.messages.lock().push(message);
    }
}
