//! HTTP client for the ComfyUI job protocol.
//!
//! - `queue_prompt` posts a workflow to `/prompt` and returns its `prompt_id`.
//! - `await_history` polls `/history/{id}` until the job shows up.
//! - `fetch_image` downloads an output through `/view`.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::error::{AppError, AppResult};
use crate::workflow::JobDocument;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// One entry of a node's `images` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_image_type")]
    pub kind: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

/// Add a scheme when missing and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

impl ComfyUIClient {
    pub fn new(base_url: &str) -> Self {
        ComfyUIClient { client: Client::new(), base_url: normalize_base_url(base_url) }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a workflow and return the job id ComfyUI assigned to it.
    pub async fn queue_prompt(&self, document: &JobDocument) -> AppResult<String> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        tracing::debug!("Prompt payload: {} nodes", document.len());

        let response = self
            .client
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .json(&document.to_submission())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body =
                response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            let message = format!("failed to queue prompt. Status: {}, Body: {}", status, body);
            tracing::error!("{}", message);
            return Err(AppError::Protocol(message));
        }

        let body: Value = response.json().await?;
        match body.get("prompt_id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(AppError::protocol(format!("no prompt_id in /prompt response: {}", body))),
        }
    }

    async fn history_once(&self, url: &str) -> AppResult<Value> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::protocol(format!("history request failed: {}", status)));
        }
        Ok(response.json().await?)
    }

    /// Block until `/history/{prompt_id}` contains the job, or the deadline passes.
    ///
    /// Failed polls are retried until the deadline; the last one is reported
    /// in the timeout error. A poll still pending at the deadline is dropped,
    /// and no poll is scheduled at or past it.
    pub async fn await_history(&self, prompt_id: &str, timeout: Duration) -> AppResult<Value> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let deadline = Instant::now() + timeout;
        let mut last_error = None;
        loop {
            let Ok(polled) = timeout_at(deadline, self.history_once(&url)).await else {
                let pending = format!("history request still pending after {:?}", timeout);
                return Err(AppError::Timeout {
                    prompt_id: prompt_id.to_string(),
                    last_error: Some(pending),
                });
            };
            match polled {
                Ok(mut body) => {
                    if let Some(entry) = body.as_object_mut().and_then(|m| m.remove(prompt_id)) {
                        return Ok(entry);
                    }
                }
                Err(e) => {
                    tracing::debug!("history poll for {} failed: {}", prompt_id, e);
                    last_error = Some(e.to_string());
                }
            }
            let next_poll = Instant::now() + POLL_INTERVAL;
            if next_poll >= deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(AppError::Timeout { prompt_id: prompt_id.to_string(), last_error });
            }
            tokio::time::sleep_until(next_poll).await;
        }
    }

    pub fn view_url(&self, image: &ImageRef) -> AppResult<String> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/view", self.base_url),
            &[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ],
        )
        .map_err(|e| AppError::configuration(format!("bad ComfyUI url {}: {}", self.base_url, e)))?;
        Ok(url.to_string())
    }

    pub async fn fetch_image(&self, image: &ImageRef) -> AppResult<Vec<u8>> {
        let url = self.view_url(image)?;
        self.fetch_bytes(&url).await
    }

    /// Plain GET with a bounded timeout.
    pub async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.client.get(url).timeout(FETCH_TIMEOUT).send().await?;
        let response = response.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// List models within a category from `/models/<category>`.
    pub async fn get_models_in_category(&self, category: &str) -> AppResult<Vec<String>> {
        if !category.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(AppError::configuration(format!("invalid model category '{}'", category)));
        }
        let url = format!("{}/models/{}", self.base_url, category);
        let response = self.client.get(&url).timeout(FETCH_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(AppError::protocol(format!(
                "failed to list models in '{}': {}",
                category,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Source for `ckpt_name` values.
    pub async fn get_checkpoints(&self) -> AppResult<Vec<String>> {
        self.get_models_in_category("checkpoints").await
    }
}

/// First image of the first output node that produced any.
pub fn first_output_image(history_entry: &Value) -> Option<ImageRef> {
    history_entry
        .get("outputs")?
        .as_object()?
        .values()
        .filter_map(|output| output.get("images")?.as_array()?.first())
        .find_map(|image| serde_json::from_value(image.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_gets_scheme_and_loses_slash() {
        assert_eq!(normalize_base_url("127.0.0.1:8188/"), "http://127.0.0.1:8188");
        assert_eq!(normalize_base_url("https://gpu.local"), "https://gpu.local");
    }

    #[test]
    fn first_image_skips_outputs_without_images() {
        let entry = json!({"outputs": {
            "7": {"text": ["nothing"]},
            "8": {"images": []},
            "9": {"images": [{"filename": "a_00001_.png", "subfolder": "", "type": "output"},
                             {"filename": "a_00002_.png", "subfolder": "", "type": "output"}]}
        }});
        let image = first_output_image(&entry).unwrap();
        assert_eq!(image.filename, "a_00001_.png");
        assert_eq!(image.kind, "output");
    }

    #[test]
    fn no_outputs_means_no_image() {
        assert_eq!(first_output_image(&json!({"status": {}})), None);
        assert_eq!(first_output_image(&json!({"outputs": {}})), None);
    }

    #[test]
    fn view_url_escapes_query() {
        let client = ComfyUIClient::new("http://h:1");
        let image =
            ImageRef { filename: "a b.png".into(), subfolder: "x/y".into(), kind: "temp".into() };
        let url = client.view_url(&image).unwrap();
        assert!(url.starts_with("http://h:1/view?filename=a+b.png"));
        assert!(url.contains("subfolder=x%2Fy"));
        assert!(url.ends_with("type=temp"));
    }
}
