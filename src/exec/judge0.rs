use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Executor, Submission};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct SubmissionRequest<'a> {
    source_code: &'a str,
    language_id: u32,
}

/// Client for the Judge0 submissions API in synchronous (`wait=true`) mode.
pub struct Judge0Executor {
    client: Client,
    config: ExecutionConfig,
}

impl Judge0Executor {
    pub fn new(config: ExecutionConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }

    fn submissions_url(&self) -> String {
        format!(
            "{}/submissions?base64_encoded=false&wait=true",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Executor for Judge0Executor {
    async fn submit(&self, source: &str, language_id: u32) -> Result<Submission> {
        let resp = self
            .client
            .post(self.submissions_url())
            .header("x-rapidapi-key", &self.config.api_key)
            .header("x-rapidapi-host", &self.config.api_host)
            .json(&SubmissionRequest {
                source_code: source,
                language_id,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::error!("Execution service returned {}", status);
            return Err(Error::Transport(format!("execution service returned {status}")));
        }

        Ok(resp.json::<Submission>().await?)
    }
}
