use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notification, Notifier};
use crate::config::EmailConfig;
use crate::error::{Error, Result};

pub const DEFAULT_EMAILJS_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: TemplateParams<'a>,
}

#[derive(Serialize)]
struct TemplateParams<'a> {
    from_email: &'a str,
    email: &'a str,
    message: &'a str,
}

/// Sends notifications through the EmailJS REST API using a single template.
pub struct EmailJsNotifier {
    client: Client,
    config: EmailConfig,
}

impl EmailJsNotifier {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let request = SendRequest {
            service_id: &self.config.service_id,
            template_id: &self.config.template_id,
            user_id: &self.config.public_key,
            template_params: TemplateParams {
                from_email: &notification.from,
                email: &notification.to,
                message: &notification.body,
            },
        };

        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!("Email sent to {}", notification.to);
            return Ok(());
        }

        let detail = resp.text().await.unwrap_or_default();
        tracing::error!("Email send to {} failed: {} {}", notification.to, status, detail);
        Err(Error::Transport(format!("email service returned {status}")))
    }
}
