use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared read-only by the controller, the API client and the presentation
/// layers. Built once from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server_url: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// How long a notification stays up before it dismisses itself.
    #[serde(with = "humantime_serde")]
    pub notification_duration: Duration,
    /// Pause between a completed run and the switch to the results view.
    #[serde(with = "humantime_serde")]
    pub results_delay: Duration,
    pub download_dir: PathBuf,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            connect_timeout: Duration::from_secs(10),
            notification_duration: Duration::from_millis(5000),
            results_delay: Duration::from_millis(2000),
            download_dir: default_download_dir(),
            user_agent: format!("drs-validator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// The user's download directory, or the working directory when there is none.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Where the dashboard writes its log, since stderr belongs to the terminal UI.
pub fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("drs-validator")
        .join("drs-validator.log")
}
