use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Raw form contents as typed by the user. Nothing here is validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationForm {
    pub scenario_id: String,
    pub ip_address: String,
    pub port: String,
    pub timeout: String,
    /// Free-form `key=value` fields forwarded verbatim.
    pub extra: Vec<(String, String)>,
}

/// Body of `POST /api/validate`. Built once per submission by
/// [`crate::validators::build_request`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRequest {
    pub scenario_id: String,
    pub ip_address: String,
    pub port: u16,
    /// A JSON number when the form value is numeric, otherwise the raw string.
    pub timeout: serde_json::Value,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrevalidateRequest {
    pub ip_address: String,
    pub port: u16,
}

/// `{success, error?}` acknowledgement returned by prevalidate and batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiAck {
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Completed => "Completed",
            RunState::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// One unit of streamed progress. Every field is optional and applied on its own.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressEvent {
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    #[default]
    Failure,
}

impl From<String> for ResultStatus {
    fn from(s: String) -> Self {
        if s == "success" {
            ResultStatus::Success
        } else {
            ResultStatus::Failure
        }
    }
}

impl<'de> Deserialize<'de> for ResultStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.map(ResultStatus::from).unwrap_or(ResultStatus::Failure))
    }
}

/// Server-owned record of a past validation. Fetched, never built locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_ip: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub port: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scenario: String,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
    /// Detail fields only present on `GET /api/results/{id}`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ValidationResult {
    pub fn device(&self) -> String {
        format!("{}:{}", self.device_ip, self.port)
    }

    pub fn duration_label(&self) -> String {
        match &self.duration {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
            _ => "N/A".to_string(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            ResultStatus::Success => "Success",
            ResultStatus::Failure => "Failed",
        }
    }

    /// Timestamp in local time when it parses, otherwise the raw server value.
    pub fn local_timestamp(&self) -> String {
        crate::format::local_datetime(&self.timestamp).unwrap_or_else(|| self.timestamp.clone())
    }
}

/// Accept strings, numbers and booleans where the server is loose about types.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    pub fn title(self) -> &'static str {
        match self {
            NotificationKind::Success => "Success",
            NotificationKind::Error => "Error",
            NotificationKind::Warning => "Warning",
            NotificationKind::Info => "Info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

/// Colour class of an output log line, derived from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Error,
    Success,
    Warning,
    Info,
}

impl LineLevel {
    pub fn classify(text: &str) -> Self {
        if text.contains("ERROR") || text.contains("FAILED") {
            LineLevel::Error
        } else if text.contains("SUCCESS") || text.contains("OK") {
            LineLevel::Success
        } else if text.contains("WARNING") {
            LineLevel::Warning
        } else {
            LineLevel::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub stamp: String,
    pub text: String,
    pub level: LineLevel,
}

impl OutputLine {
    pub fn now(text: String) -> Self {
        Self {
            stamp: crate::format::clock_stamp(),
            level: LineLevel::classify(&text),
            text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tab {
    Validation,
    Results,
    Batch,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Validation, Tab::Results, Tab::Batch, Tab::Help];

    /// Breadcrumb / sidebar label.
    pub fn title(self) -> &'static str {
        match self {
            Tab::Validation => "Validation",
            Tab::Results => "Results",
            Tab::Batch => "Batch Commands",
            Tab::Help => "Help",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

/// Controls that show a loading state while their request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Control {
    Submit,
    Prevalidate,
    Batch,
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum UiEvent {
    RunState(RunState),
    /// A submission was refused before any network call (busy or invalid form).
    RunRejected(String),
    Progress(f64),
    StatusText(String),
    OutputAppended(OutputLine),
    OutputCleared,
    Notify(Notification),
    DismissNotification(u64),
    SwitchTab(Tab),
    Results(Vec<ValidationResult>),
    // Box to keep UiEvent small; detail records can carry many extra fields.
    ResultDetail(Box<ValidationResult>),
    Loading { control: Control, loading: bool },
    FileSaved(PathBuf),
}
