//! Validation run state machine.
//!
//! Pure: every input updates the run fields and returns the effects the controller
//! must carry out. Nothing here touches the network, timers or the screen.

use crate::model::{Control, NotificationKind, RunState, Tab, ValidationForm, ValidationRequest};
use crate::stream::StreamLine;
use crate::validators::{self, FormError};
use std::time::Duration;

pub const STATUS_STARTING: &str = "Starting validation...";
pub const STATUS_COMPLETED: &str = "Validation completed";

/// Identifies one accepted run so late messages from an older run can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunHandle(u64);

impl RunHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRejection {
    Busy,
    Invalid(FormError),
}

impl std::fmt::Display for StartRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartRejection::Busy => write!(f, "Validation already in progress"),
            StartRejection::Invalid(e) => write!(f, "{e}"),
        }
    }
}

/// What the run task reports back about its stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    Line(StreamLine),
    StreamEnded,
    /// Non-2xx status, connection error, or a read error mid-body.
    TransportFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify(NotificationKind, String),
    PostValidation(RunHandle, ValidationRequest),
    SetState(RunState),
    SetProgress(f64),
    SetStatus(String),
    AppendOutput(String),
    ClearOutput,
    SetLoading(Control, bool),
    ScheduleResultsView(Duration),
    SwitchTab(Tab),
    RefreshResults,
}

pub struct StartOutcome {
    pub result: Result<RunHandle, StartRejection>,
    pub effects: Vec<Effect>,
}

pub struct RunMachine {
    state: RunState,
    progress: f64,
    status: String,
    output: Vec<String>,
    current: Option<RunHandle>,
    next_run: u64,
    results_delay: Duration,
}

impl RunMachine {
    pub fn new(results_delay: Duration) -> Self {
        Self {
            state: RunState::Idle,
            progress: 0.0,
            status: String::new(),
            output: Vec::new(),
            current: None,
            next_run: 0,
            results_delay,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn current(&self) -> Option<RunHandle> {
        self.current
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Accept or refuse a submission. A refusal leaves every run field untouched.
    pub fn start(&mut self, form: &ValidationForm) -> StartOutcome {
        if self.is_running() {
            let rejection = StartRejection::Busy;
            return StartOutcome {
                effects: vec![Effect::Notify(NotificationKind::Warning, rejection.to_string())],
                result: Err(rejection),
            };
        }

        let request = match validators::build_request(form) {
            Ok(r) => r,
            Err(e) => {
                return StartOutcome {
                    effects: vec![Effect::Notify(NotificationKind::Error, e.to_string())],
                    result: Err(StartRejection::Invalid(e)),
                };
            }
        };

        self.next_run += 1;
        let handle = RunHandle(self.next_run);
        self.current = Some(handle);
        self.state = RunState::Running;
        self.progress = 0.0;
        self.status = STATUS_STARTING.to_string();
        self.output.clear();

        StartOutcome {
            result: Ok(handle),
            effects: vec![
                Effect::SetState(RunState::Running),
                Effect::SetProgress(0.0),
                Effect::SetStatus(STATUS_STARTING.to_string()),
                Effect::ClearOutput,
                Effect::SetLoading(Control::Submit, true),
                Effect::PostValidation(handle, request),
            ],
        }
    }

    /// Apply a report from the run task. Reports for anything but the active run
    /// are dropped.
    pub fn apply(&mut self, run: RunHandle, input: RunInput) -> Vec<Effect> {
        if self.current != Some(run) || !self.is_running() {
            return Vec::new();
        }
        match input {
            RunInput::Line(StreamLine::Progress(ev)) => {
                let mut effects = Vec::new();
                if let Some(p) = ev.progress {
                    self.progress = p;
                    effects.push(Effect::SetProgress(p));
                }
                if let Some(msg) = ev.message.filter(|m| !m.is_empty()) {
                    self.status = msg.clone();
                    effects.push(Effect::SetStatus(msg.clone()));
                    effects.push(self.append(msg));
                }
                if let Some(out) = ev.output.filter(|o| !o.is_empty()) {
                    effects.push(self.append(out));
                }
                effects
            }
            RunInput::Line(StreamLine::Raw(text)) => vec![self.append(text)],
            RunInput::StreamEnded => {
                self.state = RunState::Completed;
                self.progress = 100.0;
                self.status = STATUS_COMPLETED.to_string();
                vec![
                    Effect::SetProgress(100.0),
                    Effect::SetStatus(STATUS_COMPLETED.to_string()),
                    Effect::SetState(RunState::Completed),
                    Effect::Notify(
                        NotificationKind::Success,
                        "Validation completed successfully".into(),
                    ),
                    Effect::SetLoading(Control::Submit, false),
                    Effect::ScheduleResultsView(self.results_delay),
                ]
            }
            RunInput::TransportFailed(reason) => {
                self.state = RunState::Failed;
                vec![
                    Effect::SetState(RunState::Failed),
                    Effect::Notify(
                        NotificationKind::Error,
                        format!("Error during validation: {reason}"),
                    ),
                    Effect::SetLoading(Control::Submit, false),
                ]
            }
        }
    }

    /// The post-completion delay ran out.
    pub fn results_delay_elapsed(&self) -> Vec<Effect> {
        vec![Effect::SwitchTab(Tab::Results), Effect::RefreshResults]
    }

    pub fn clear_output(&mut self) -> Vec<Effect> {
        self.output.clear();
        vec![Effect::ClearOutput]
    }

    fn append(&mut self, text: String) -> Effect {
        self.output.push(text.clone());
        Effect::AppendOutput(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressEvent;
    use crate::stream::parse_line;

    fn form() -> ValidationForm {
        ValidationForm {
            scenario_id: "basic".into(),
            ip_address: "192.168.1.20".into(),
            port: "20000".into(),
            timeout: "30".into(),
            extra: Vec::new(),
        }
    }

    fn machine() -> RunMachine {
        RunMachine::new(Duration::from_millis(2000))
    }

    fn started() -> (RunMachine, RunHandle) {
        let mut m = machine();
        let run = m.start(&form()).result.unwrap();
        (m, run)
    }

    fn posts(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::PostValidation(..)))
            .count()
    }

    fn line(m: &mut RunMachine, run: RunHandle, raw: &str) -> Vec<Effect> {
        match parse_line(raw) {
            Some(l) => m.apply(run, RunInput::Line(l)),
            None => Vec::new(),
        }
    }

    #[test]
    fn accepted_start_resets_and_posts_once() {
        let mut m = machine();
        let out = m.start(&form());
        assert!(out.result.is_ok());
        assert_eq!(posts(&out.effects), 1);
        assert_eq!(m.state(), RunState::Running);
        assert_eq!(m.progress(), 0.0);
        assert_eq!(m.status(), STATUS_STARTING);
        assert!(out.effects.contains(&Effect::ClearOutput));
        assert!(out.effects.contains(&Effect::SetLoading(Control::Submit, true)));
    }

    #[test]
    fn invalid_ip_or_port_is_rejected_without_a_post() {
        for (ip, port) in [("192.168.1", "20000"), ("10.0.0.1", "0"), ("10.0.0.1", "65536")] {
            let mut m = machine();
            let mut f = form();
            f.ip_address = ip.into();
            f.port = port.into();
            let out = m.start(&f);
            assert!(matches!(out.result, Err(StartRejection::Invalid(_))));
            assert_eq!(posts(&out.effects), 0);
            assert_eq!(m.state(), RunState::Idle);
            assert!(matches!(
                out.effects.as_slice(),
                [Effect::Notify(NotificationKind::Error, _)]
            ));
        }
    }

    #[test]
    fn rejected_form_does_not_touch_a_finished_run() {
        let (mut m, run) = started();
        line(&mut m, run, "kept line");
        m.apply(run, RunInput::StreamEnded);

        let mut f = form();
        f.scenario_id.clear();
        let out = m.start(&f);
        assert_eq!(
            out.result,
            Err(StartRejection::Invalid(FormError::MissingFields(vec!["scenario_id"])))
        );
        assert_eq!(m.state(), RunState::Completed);
        assert_eq!(m.output(), ["kept line".to_string()]);
        assert_eq!(m.progress(), 100.0);
    }

    #[test]
    fn second_start_while_running_is_a_no_op() {
        let (mut m, run) = started();
        line(&mut m, run, r#"data: {"progress":40}"#);

        let out = m.start(&form());
        assert_eq!(out.result, Err(StartRejection::Busy));
        assert_eq!(posts(&out.effects), 0);
        assert_eq!(
            out.effects,
            vec![Effect::Notify(
                NotificationKind::Warning,
                "Validation already in progress".into()
            )]
        );
        assert_eq!(m.current(), Some(run));
        assert_eq!(m.progress(), 40.0);
        assert_eq!(m.state(), RunState::Running);
    }

    #[test]
    fn progress_only_line_leaves_output_alone() {
        let (mut m, run) = started();
        let effects = line(&mut m, run, "data: {\"progress\":50}\n");
        assert_eq!(effects, vec![Effect::SetProgress(50.0)]);
        assert_eq!(m.progress(), 50.0);
        assert!(m.output().is_empty());
    }

    #[test]
    fn plain_text_is_appended_verbatim_and_run_continues() {
        let (mut m, run) = started();
        let effects = line(&mut m, run, "plain log line\n");
        assert_eq!(effects, vec![Effect::AppendOutput("plain log line".into())]);
        assert_eq!(m.output(), ["plain log line".to_string()]);
        assert_eq!(m.state(), RunState::Running);
    }

    #[test]
    fn message_updates_status_and_output_while_output_only_appends() {
        let (mut m, run) = started();
        let effects = m.apply(
            run,
            RunInput::Line(StreamLine::Progress(ProgressEvent {
                progress: None,
                message: Some("Sending command 3/10".into()),
                output: Some("<- 0x01 0x02".into()),
            })),
        );
        assert_eq!(
            effects,
            vec![
                Effect::SetStatus("Sending command 3/10".into()),
                Effect::AppendOutput("Sending command 3/10".into()),
                Effect::AppendOutput("<- 0x01 0x02".into()),
            ]
        );
        assert_eq!(m.status(), "Sending command 3/10");
        assert_eq!(m.output().len(), 2);
    }

    #[test]
    fn progress_is_applied_as_received() {
        let (mut m, run) = started();
        line(&mut m, run, r#"data: {"progress":80}"#);
        line(&mut m, run, r#"data: {"progress":30}"#);
        assert_eq!(m.progress(), 30.0);
    }

    #[test]
    fn stream_end_completes_and_schedules_results_view() {
        let (mut m, run) = started();
        line(&mut m, run, r#"data: {"progress":60}"#);
        let effects = m.apply(run, RunInput::StreamEnded);
        assert_eq!(m.state(), RunState::Completed);
        assert_eq!(m.progress(), 100.0);
        assert_eq!(m.status(), STATUS_COMPLETED);
        assert!(effects.contains(&Effect::ScheduleResultsView(Duration::from_millis(2000))));
        assert!(effects.contains(&Effect::SetLoading(Control::Submit, false)));
        assert_eq!(
            m.results_delay_elapsed(),
            vec![Effect::SwitchTab(Tab::Results), Effect::RefreshResults]
        );
    }

    #[test]
    fn transport_failure_emits_one_error() {
        let (mut m, run) = started();
        let effects = m.apply(run, RunInput::TransportFailed("HTTP 500".into()));
        assert_eq!(m.state(), RunState::Failed);
        let errors = effects
            .iter()
            .filter(|e| matches!(e, Effect::Notify(NotificationKind::Error, _)))
            .count();
        assert_eq!(errors, 1);
        // Anything arriving afterwards is ignored.
        assert!(m.apply(run, RunInput::StreamEnded).is_empty());
        assert!(line(&mut m, run, "late").is_empty());
    }

    #[test]
    fn stale_run_reports_are_dropped() {
        let (mut m, first) = started();
        m.apply(first, RunInput::StreamEnded);
        let second = m.start(&form()).result.unwrap();
        assert_ne!(first, second);
        assert!(line(&mut m, first, "from the old run").is_empty());
        assert!(m.output().is_empty());
    }

    #[test]
    fn new_run_allowed_after_failure() {
        let (mut m, run) = started();
        m.apply(run, RunInput::TransportFailed("connection refused".into()));
        let out = m.start(&form());
        assert!(out.result.is_ok());
        assert_eq!(m.state(), RunState::Running);
    }

    #[test]
    fn clearing_output_keeps_the_run_going() {
        let (mut m, run) = started();
        line(&mut m, run, "first");
        assert_eq!(m.clear_output(), vec![Effect::ClearOutput]);
        assert!(m.output().is_empty());
        assert_eq!(m.state(), RunState::Running);
        line(&mut m, run, "second");
        assert_eq!(m.output(), ["second".to_string()]);
    }
}
