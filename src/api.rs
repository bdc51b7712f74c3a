//! HTTP client for the validation server's REST and streaming endpoints.

use crate::config::AppConfig;
use crate::model::{ApiAck, PrevalidateRequest, ValidationRequest, ValidationResult};
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use reqwest::{multipart, Url};
use std::path::Path;
use tracing::debug;

#[derive(Clone)]
pub struct ValidatorClient {
    http: reqwest::Client,
    base: Url,
}

impl ValidatorClient {
    pub fn new(cfg: &AppConfig) -> Result<Self> {
        let mut base = Url::parse(&cfg.server_url)
            .with_context(|| format!("invalid server URL: {}", cfg.server_url))?;
        if base.cannot_be_a_base() {
            bail!("server URL cannot be used as a base: {}", cfg.server_url);
        }
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        // Only connecting is bounded; a validation stream may run as long as it needs.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.connect_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build `<base>/api/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    pub async fn prevalidate(&self, ip_address: &str, port: u16) -> Result<ApiAck> {
        let url = self.endpoint(&["prevalidate"]);
        debug!(%url, ip_address, port, "prevalidate");
        let body = PrevalidateRequest {
            ip_address: ip_address.to_string(),
            port,
        };
        // The server answers {success:false, error} with non-2xx codes too, so the body
        // is read regardless of status.
        self.http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("prevalidate request failed")?
            .json::<ApiAck>()
            .await
            .context("decode prevalidate response")
    }

    /// Open the validation stream. Non-2xx statuses are errors and no body is read.
    pub async fn start_validation(&self, request: &ValidationRequest) -> Result<reqwest::Response> {
        let url = self.endpoint(&["validate"]);
        debug!(%url, scenario = %request.scenario_id, "start validation");
        let resp = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .context("validation request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }
        Ok(resp)
    }

    pub async fn list_results(&self) -> Result<Vec<ValidationResult>> {
        self.get(&["results"])
            .await?
            .json()
            .await
            .context("decode results list")
    }

    pub async fn get_result(&self, id: &str) -> Result<ValidationResult> {
        self.get(&["results", id])
            .await?
            .json()
            .await
            .with_context(|| format!("decode result {id}"))
    }

    pub async fn download_result(&self, id: &str) -> Result<Bytes> {
        self.get(&["results", id, "download"])
            .await?
            .bytes()
            .await
            .with_context(|| format!("read download of result {id}"))
    }

    pub async fn export_all(&self) -> Result<Bytes> {
        self.get(&["results", "export"])
            .await?
            .bytes()
            .await
            .context("read results export")
    }

    pub async fn upload_batch(&self, file: &Path) -> Result<ApiAck> {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("read batch file {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "batch.txt".into());
        let form = multipart::Form::new().part("file", multipart::Part::bytes(data).file_name(name));
        let url = self.endpoint(&["batch", "upload"]);
        debug!(%url, file = %file.display(), "upload batch");
        self.http
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("batch upload failed")?
            .json::<ApiAck>()
            .await
            .context("decode batch upload response")
    }

    async fn get(&self, segments: &[&str]) -> Result<reqwest::Response> {
        let url = self.endpoint(segments);
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url}: HTTP {status}");
        }
        Ok(resp)
    }
}
