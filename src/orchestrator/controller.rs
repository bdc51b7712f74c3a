//! Validation controller.
//!
//! Owns the run machine, carries out its effects and emits events for presentation
//! layers. Network calls and timers run as tasks that report back over an internal
//! channel, so this loop is the only writer of run state.

use super::machine::{Effect, RunHandle, RunInput, RunMachine};
use super::scheduler::{Scheduler, TimerId};
use crate::api::ValidatorClient;
use crate::config::AppConfig;
use crate::format;
use crate::model::{
    Control, Notification, NotificationKind, OutputLine, Tab, UiEvent, ValidationForm,
    ValidationRequest,
};
use crate::storage;
use crate::stream::LineDecoder;
use crate::validators;
use anyhow::Result;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub enum UiCommand {
    StartValidation(ValidationForm),
    Prevalidate { ip_address: String, port: String },
    ClearOutput,
    RefreshResults,
    ViewResult(String),
    DownloadResult(String),
    ExportResults,
    /// `None` when no file was chosen.
    UploadBatch(Option<PathBuf>),
    DismissNotification(u64),
    Quit,
}

/// Reports from tasks and timers back into the controller loop.
#[derive(Debug)]
enum Internal {
    Run(RunHandle, RunInput),
    ResultsDelayElapsed,
    DismissNotification(u64),
    Notify(NotificationKind, String),
    Ui(UiEvent),
}

struct Controller {
    cfg: Arc<AppConfig>,
    client: ValidatorClient,
    ui_tx: UnboundedSender<UiEvent>,
    internal_tx: UnboundedSender<Internal>,
    machine: RunMachine,
    timers: Scheduler<Internal>,
    /// Dismiss timer of every notification still on screen.
    toasts: HashMap<u64, TimerId>,
    next_toast: u64,
    run_task: Option<(RunHandle, JoinHandle<()>)>,
}

impl Controller {
    fn emit(&self, ev: UiEvent) {
        let _ = self.ui_tx.send(ev);
    }

    fn notify(&mut self, kind: NotificationKind, message: String) {
        match kind {
            NotificationKind::Error => error!(%message, "notification"),
            NotificationKind::Warning => warn!(%message, "notification"),
            _ => info!(%message, "notification"),
        }
        self.next_toast += 1;
        let id = self.next_toast;
        let duration = self.cfg.notification_duration;
        let timer = self
            .timers
            .schedule(duration, Internal::DismissNotification(id));
        self.toasts.insert(id, timer);
        self.emit(UiEvent::Notify(Notification {
            id,
            kind,
            message,
            duration,
        }));
    }

    fn dismiss(&mut self, id: u64) {
        if let Some(timer) = self.toasts.remove(&id) {
            self.timers.cancel(timer);
            self.emit(UiEvent::DismissNotification(id));
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(kind, message) => self.notify(kind, message),
                Effect::PostValidation(handle, request) => self.spawn_run(handle, request),
                Effect::SetState(s) => self.emit(UiEvent::RunState(s)),
                Effect::SetProgress(p) => self.emit(UiEvent::Progress(p)),
                Effect::SetStatus(s) => self.emit(UiEvent::StatusText(s)),
                Effect::AppendOutput(text) => self.emit(UiEvent::OutputAppended(OutputLine::now(text))),
                Effect::ClearOutput => self.emit(UiEvent::OutputCleared),
                Effect::SetLoading(control, loading) => {
                    self.emit(UiEvent::Loading { control, loading })
                }
                Effect::ScheduleResultsView(delay) => {
                    self.timers.schedule(delay, Internal::ResultsDelayElapsed);
                }
                Effect::SwitchTab(tab) => self.emit(UiEvent::SwitchTab(tab)),
                Effect::RefreshResults => self.refresh_results(),
            }
        }
    }

    fn handle_command(&mut self, cmd: UiCommand) {
        debug!(?cmd, "command");
        match cmd {
            UiCommand::StartValidation(form) => {
                let outcome = self.machine.start(&form);
                if let Err(rejection) = &outcome.result {
                    info!(%rejection, "validation refused");
                    self.emit(UiEvent::RunRejected(rejection.to_string()));
                }
                self.apply_effects(outcome.effects);
            }
            UiCommand::Prevalidate { ip_address, port } => self.prevalidate(ip_address, port),
            UiCommand::ClearOutput => {
                let effects = self.machine.clear_output();
                self.apply_effects(effects);
            }
            UiCommand::RefreshResults => self.refresh_results(),
            UiCommand::ViewResult(id) => self.view_result(id),
            UiCommand::DownloadResult(id) => self.download_result(id),
            UiCommand::ExportResults => self.export_results(),
            UiCommand::UploadBatch(file) => self.upload_batch(file),
            UiCommand::DismissNotification(id) => self.dismiss(id),
            // Handled by the loop.
            UiCommand::Quit => {}
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Run(handle, input) => {
                let effects = self.machine.apply(handle, input);
                self.apply_effects(effects);
            }
            Internal::ResultsDelayElapsed => {
                let effects = self.machine.results_delay_elapsed();
                self.apply_effects(effects);
            }
            Internal::DismissNotification(id) => {
                if self.toasts.remove(&id).is_some() {
                    self.emit(UiEvent::DismissNotification(id));
                }
            }
            Internal::Notify(kind, message) => self.notify(kind, message),
            Internal::Ui(ev) => self.emit(ev),
        }
    }

    fn spawn_run(&mut self, handle: RunHandle, request: ValidationRequest) {
        info!(run = handle.id(), scenario = %request.scenario_id, device = %request.ip_address, "validation started");
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move { stream_run(client, handle, request, tx).await });
        if let Some((_, old)) = self.run_task.replace((handle, task)) {
            // Only reachable after the old run reached a terminal state.
            old.abort();
        }
    }

    /// Run task ended without reporting; only happens when it panicked.
    fn run_task_finished(&mut self, res: std::result::Result<(), tokio::task::JoinError>) {
        let Some((handle, _)) = self.run_task.take() else {
            return;
        };
        if let Err(e) = res {
            if e.is_panic() {
                error!(run = handle.id(), "validation task panicked");
                let effects = self
                    .machine
                    .apply(handle, RunInput::TransportFailed("validation task panicked".into()));
                self.apply_effects(effects);
            }
        }
    }

    fn prevalidate(&mut self, ip_address: String, port: String) {
        let ip_address = ip_address.trim().to_string();
        if ip_address.is_empty() || port.trim().is_empty() {
            self.notify(
                NotificationKind::Error,
                "Please enter IP address and port before prevalidating".into(),
            );
            return;
        }
        let Some(port) = validators::parse_port(&port) else {
            self.notify(
                NotificationKind::Error,
                "Port must be between 1 and 65535".into(),
            );
            return;
        };

        self.emit(UiEvent::Loading {
            control: Control::Prevalidate,
            loading: true,
        });
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let report = match client.prevalidate(&ip_address, port).await {
                Ok(ack) if ack.success => Internal::Notify(
                    NotificationKind::Success,
                    "Connection to device succeeded".into(),
                ),
                Ok(ack) => Internal::Notify(
                    NotificationKind::Error,
                    format!("Connection error: {}", ack.error_message()),
                ),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "prevalidate failed");
                    Internal::Notify(
                        NotificationKind::Error,
                        "Failed to validate connection".into(),
                    )
                }
            };
            let _ = tx.send(report);
            let _ = tx.send(Internal::Ui(UiEvent::Loading {
                control: Control::Prevalidate,
                loading: false,
            }));
        });
    }

    fn refresh_results(&self) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            match client.list_results().await {
                Ok(results) => {
                    debug!(count = results.len(), "results refreshed");
                    let _ = tx.send(Internal::Ui(UiEvent::Results(results)));
                }
                Err(e) => warn!(error = %format!("{e:#}"), "failed to load results"),
            }
        });
    }

    fn view_result(&self, id: String) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let msg = match client.get_result(&id).await {
                Ok(r) => Internal::Ui(UiEvent::ResultDetail(Box::new(r))),
                Err(e) => {
                    warn!(%id, error = %format!("{e:#}"), "failed to load result");
                    Internal::Notify(NotificationKind::Error, "Failed to load result".into())
                }
            };
            let _ = tx.send(msg);
        });
    }

    fn download_result(&self, id: String) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        let path = storage::download_path(&self.cfg.download_dir, &id);
        tokio::spawn(async move {
            let res = async {
                let data = client.download_result(&id).await?;
                storage::save_bytes(&path, &data).await
            }
            .await;
            match res {
                Ok(()) => {
                    info!(%id, path = %path.display(), "result downloaded");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Info,
                        format!("Result saved to {}", path.display()),
                    ));
                    let _ = tx.send(Internal::Ui(UiEvent::FileSaved(path)));
                }
                Err(e) => {
                    warn!(%id, error = %format!("{e:#}"), "download failed");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Error,
                        "Failed to download result".into(),
                    ));
                }
            }
        });
    }

    fn export_results(&self) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        let path = storage::export_path(&self.cfg.download_dir, &format::today());
        tokio::spawn(async move {
            let res = async {
                let data = client.export_all().await?;
                storage::save_bytes(&path, &data).await
            }
            .await;
            match res {
                Ok(()) => {
                    info!(path = %path.display(), "results exported");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Success,
                        "Results exported successfully".into(),
                    ));
                    let _ = tx.send(Internal::Ui(UiEvent::FileSaved(path)));
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "export failed");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Error,
                        "Failed to export results".into(),
                    ));
                }
            }
        });
    }

    fn upload_batch(&mut self, file: Option<PathBuf>) {
        let Some(file) = file.filter(|f| !f.as_os_str().is_empty()) else {
            self.notify(NotificationKind::Warning, "Please select a file".into());
            return;
        };
        self.emit(UiEvent::Loading {
            control: Control::Batch,
            loading: true,
        });
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            match client.upload_batch(&file).await {
                Ok(ack) if ack.success => {
                    info!(file = %file.display(), "batch executed");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Success,
                        "Batch file uploaded and executed".into(),
                    ));
                    let _ = tx.send(Internal::Ui(UiEvent::SwitchTab(Tab::Validation)));
                }
                Ok(ack) => {
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Error,
                        format!("Error: {}", ack.error_message()),
                    ));
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %format!("{e:#}"), "batch upload failed");
                    let _ = tx.send(Internal::Notify(
                        NotificationKind::Error,
                        "Failed to upload batch file".into(),
                    ));
                }
            }
            let _ = tx.send(Internal::Ui(UiEvent::Loading {
                control: Control::Batch,
                loading: false,
            }));
        });
    }

    /// Cancel every timer and drop an in-flight run without waiting for it.
    fn shutdown(&mut self) {
        self.timers.shutdown();
        self.toasts.clear();
        if let Some((handle, task)) = self.run_task.take() {
            if !task.is_finished() {
                info!(run = handle.id(), "abandoning in-flight validation");
            }
            task.abort();
        }
    }
}

/// POST the request and feed the streamed body back as run inputs.
async fn stream_run(
    client: ValidatorClient,
    handle: RunHandle,
    request: ValidationRequest,
    tx: UnboundedSender<Internal>,
) {
    let send = |input: RunInput| {
        let _ = tx.send(Internal::Run(handle, input));
    };

    let resp = match client.start_validation(&request).await {
        Ok(r) => r,
        Err(e) => {
            warn!(run = handle.id(), error = %format!("{e:#}"), "validation request failed");
            send(RunInput::TransportFailed(format!("{e:#}")));
            return;
        }
    };

    let mut decoder = LineDecoder::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for line in decoder.push(&bytes) {
                    send(RunInput::Line(line));
                }
            }
            Err(e) => {
                warn!(run = handle.id(), error = %e, "validation stream broke");
                send(RunInput::TransportFailed(e.to_string()));
                return;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        send(RunInput::Line(line));
    }
    debug!(run = handle.id(), "validation stream ended");
    send(RunInput::StreamEnded);
}

/// Serve UI commands until `Quit` or until every command sender is gone.
pub async fn run_controller(
    cfg: Arc<AppConfig>,
    client: ValidatorClient,
    ui_tx: UnboundedSender<UiEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();
    let mut ctl = Controller {
        machine: RunMachine::new(cfg.results_delay),
        timers: Scheduler::new(internal_tx.clone()),
        cfg,
        client,
        ui_tx,
        internal_tx,
        toasts: HashMap::new(),
        next_toast: 0,
        run_task: None,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Quit) | None => break,
                    Some(cmd) => ctl.handle_command(cmd),
                }
            }
            Some(msg) = internal_rx.recv() => ctl.handle_internal(msg),
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            done = async {
                if let Some((_, h)) = ctl.run_task.as_mut() {
                    return h.await;
                }
                futures::future::pending().await
            } => {
                ctl.run_task_finished(done);
            }
        }
    }

    ctl.shutdown();
    Ok(())
}
