use crate::api::ValidatorClient;
use crate::config::{self, AppConfig};
use crate::model::{
    NotificationKind, RunState, UiEvent, ValidationForm, ValidationResult,
};
use crate::orchestrator::{run_controller, UiCommand};
use crate::storage;
use crate::validators;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "drs-validator",
    version,
    about = "Dashboard and CLI client for the DRS device validation server"
)]
pub struct Cli {
    /// Base URL of the validation server
    #[arg(
        long,
        global = true,
        env = "DRS_VALIDATOR_SERVER",
        default_value = "http://127.0.0.1:8000"
    )]
    pub server: String,

    /// Timeout for establishing a connection to the server
    #[arg(long, global = true, default_value = "10s")]
    pub connect_timeout: humantime::Duration,

    /// How long notifications stay on screen
    #[arg(long, global = true, default_value = "5s")]
    pub notification_duration: humantime::Duration,

    /// Pause between a completed run and the switch to the results view
    #[arg(long, global = true, default_value = "2s")]
    pub results_delay: humantime::Duration,

    /// Where downloads and exports are saved (default: the user's download directory)
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Log filter, e.g. info or drs_validator=debug (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log file used by the dashboard
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Scenario to run
    #[arg(long, global = true)]
    pub scenario: Option<String>,

    /// Device IP address
    #[arg(long, global = true)]
    pub ip: Option<String>,

    /// Device port
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Validation timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Extra request field forwarded verbatim (repeatable)
    #[arg(long = "field", global = true, value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run one validation and stream its output (no dashboard)
    Validate {
        /// Print a JSON summary of the run instead of the live log
        #[arg(long)]
        json: bool,
    },
    /// Check that the server can reach the device
    Prevalidate,
    /// List past validations
    Results {
        #[arg(long)]
        json: bool,
    },
    /// Print one validation result
    Show { id: String },
    /// Save one validation result as JSON
    Download { id: String },
    /// Save every result as CSV
    Export,
    /// Upload and execute a batch command file
    Batch { file: PathBuf },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((k.to_string(), v.to_string()))
}

impl Cli {
    /// Whether this invocation opens the dashboard.
    pub fn is_dashboard(&self) -> bool {
        cfg!(feature = "tui") && self.command.is_none()
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(config::default_log_file)
    }
}

/// Build an `AppConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> AppConfig {
    AppConfig {
        server_url: args.server.clone(),
        connect_timeout: Duration::from(args.connect_timeout),
        notification_duration: Duration::from(args.notification_duration),
        results_delay: Duration::from(args.results_delay),
        download_dir: args
            .download_dir
            .clone()
            .unwrap_or_else(config::default_download_dir),
        ..AppConfig::default()
    }
}

/// Initial form contents from CLI arguments.
pub fn build_form(args: &Cli) -> ValidationForm {
    ValidationForm {
        scenario_id: args.scenario.clone().unwrap_or_default(),
        ip_address: args.ip.clone().unwrap_or_default(),
        port: args.port.clone().unwrap_or_default(),
        timeout: args.timeout.clone().unwrap_or_default(),
        extra: args.fields.clone(),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = Arc::new(build_config(&args));
    let client = ValidatorClient::new(&cfg)?;
    let form = build_form(&args);
    tracing::debug!(server = %client.base_url(), "client ready");

    let Some(command) = args.command.clone() else {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(cfg, client, form).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without the dashboard.
            return run_validate(cfg, client, form, false).await;
        }
    };

    match command {
        Command::Validate { json } => run_validate(cfg, client, form, json).await,
        Command::Prevalidate => run_prevalidate(&client, &form).await,
        Command::Results { json } => {
            let results = client.list_results().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results_table(&results);
            }
            Ok(())
        }
        Command::Show { id } => {
            let result = client
                .get_result(&id)
                .await
                .context("Failed to load result")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Download { id } => {
            let path = storage::download_path(&cfg.download_dir, &id);
            let data = client
                .download_result(&id)
                .await
                .context("Failed to download result")?;
            storage::save_bytes(&path, &data).await?;
            eprintln!("Saved: {}", path.display());
            Ok(())
        }
        Command::Export => {
            let path = storage::export_path(&cfg.download_dir, &crate::format::today());
            let data = client
                .export_all()
                .await
                .context("Failed to export results")?;
            storage::save_bytes(&path, &data).await?;
            eprintln!("Results exported successfully");
            eprintln!("Saved: {}", path.display());
            Ok(())
        }
        Command::Batch { file } => {
            let ack = client
                .upload_batch(&file)
                .await
                .context("Failed to upload batch file")?;
            if !ack.success {
                bail!("Error: {}", ack.error_message());
            }
            println!("Batch file uploaded and executed");
            Ok(())
        }
    }
}

async fn run_prevalidate(client: &ValidatorClient, form: &ValidationForm) -> Result<()> {
    if form.ip_address.trim().is_empty() || form.port.trim().is_empty() {
        bail!("--ip and --port are required to prevalidate");
    }
    let port = validators::parse_port(&form.port)
        .ok_or_else(|| anyhow!("Port must be between 1 and 65535"))?;
    let ack = client
        .prevalidate(form.ip_address.trim(), port)
        .await
        .context("Failed to validate connection")?;
    if !ack.success {
        bail!("Connection error: {}", ack.error_message());
    }
    println!("Connection to device succeeded");
    Ok(())
}

/// Final state of a headless run, printed by `validate --json`.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    state: Option<RunState>,
    progress: f64,
    status: String,
    output: Vec<String>,
    notifications: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<String>,
}

/// Drive one validation through the controller and print what the dashboard would show.
async fn run_validate(
    cfg: Arc<AppConfig>,
    client: ValidatorClient,
    form: ValidationForm,
    json: bool,
) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(run_controller(cfg, client, ui_tx, cmd_rx));
    let _ = cmd_tx.send(UiCommand::StartValidation(form));

    let mut summary = RunSummary::default();
    // The controller drops its event sender after Quit, which ends this loop once every
    // event of the finished run has been drained.
    while let Some(ev) = ui_rx.recv().await {
        match ev {
            UiEvent::RunState(s) => {
                summary.state = Some(s);
                if s.is_terminal() {
                    let _ = cmd_tx.send(UiCommand::Quit);
                }
            }
            UiEvent::RunRejected(reason) => {
                summary.rejected = Some(reason);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            UiEvent::Progress(p) => {
                summary.progress = p;
                if !json {
                    let _ = out_tx.send(OutputLine::Stderr(format!("progress: {p:.0}%")));
                }
            }
            UiEvent::StatusText(s) => summary.status = s,
            UiEvent::OutputAppended(line) => {
                if !json {
                    let _ = out_tx.send(OutputLine::Stdout(format!(
                        "[{}] {}",
                        line.stamp, line.text
                    )));
                }
                summary.output.push(line.text);
            }
            UiEvent::OutputCleared => summary.output.clear(),
            UiEvent::Notify(n) => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "{}: {}",
                    n.kind.title(),
                    n.message
                )));
                if n.kind != NotificationKind::Info {
                    summary.notifications.push(n.message);
                }
            }
            _ => {}
        }
    }

    controller.await.context("controller task failed")??;

    if json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&summary)?));
    }
    drop(out_tx);
    let _ = out_handle.await;

    if let Some(reason) = summary.rejected {
        bail!(reason);
    }
    match summary.state {
        Some(RunState::Completed) => Ok(()),
        Some(RunState::Failed) => bail!("validation failed"),
        other => bail!(
            "validation ended in state {}",
            other.map(RunState::label).unwrap_or("unknown")
        ),
    }
}

fn print_results_table(results: &[ValidationResult]) {
    if results.is_empty() {
        println!("No validations available");
        return;
    }
    let rows: Vec<[String; 6]> = results
        .iter()
        .map(|r| {
            [
                r.id.clone(),
                r.local_timestamp(),
                r.device(),
                r.scenario.clone(),
                r.status_label().to_string(),
                r.duration_label(),
            ]
        })
        .collect();
    let headers = ["id", "timestamp", "device", "scenario", "status", "duration"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: [&str; 6]| {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(headers));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", rule.join("  "));
    for row in &rows {
        println!("{}", line(row.each_ref().map(String::as_str)));
    }
}
