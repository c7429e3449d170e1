//! Microsoft Graph `sendMail` delivery, for tenants where direct SMTP
//! is blocked. Client-credentials flow; a fresh token is requested per
//! send.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;
use url::Url;

use crate::error::{NoticError, Result};
use crate::mail::Mailer;
use crate::settings::MailConfig;

const TOKEN_SCOPE: &str = "https://graph.microsoft.com/.default";
const GRAPH_USERS_BASE: &str = "https://graph.microsoft.com/v1.0/users";

#[derive(Debug)]
pub struct GraphMailer {
    client: reqwest::Client,
    tenant: String,
    client_id: String,
    client_secret: SecretBox<String>,
    sender: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GraphMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        for (value, key) in [
            (&config.azure_tenant, "AZURE_TENANT_ID"),
            (&config.azure_client_id, "AZURE_CLIENT_ID"),
            (&config.graph_sender, "GRAPH_SENDER_UPN"),
        ] {
            if value.is_empty() {
                return Err(NoticError::Config(format!("{key} is not set")));
            }
        }
        if config.azure_client_secret.expose_secret().is_empty() {
            return Err(NoticError::Config("AZURE_CLIENT_SECRET is not set".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            tenant: config.azure_tenant.clone(),
            client_id: config.azure_client_id.clone(),
            client_secret: SecretBox::new(Box::new(
                config.azure_client_secret.expose_secret().clone(),
            )),
            sender: config.graph_sender.clone(),
        })
    }

    async fn fetch_token(&self) -> Result<String> {
        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant
        );
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("scope", TOKEN_SCOPE),
            ("grant_type", "client_credentials"),
        ];
        let response = self.client.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(NoticError::Notification(format!(
                "graph token request failed with status {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// `/users/{sender}/sendMail` with the sender UPN percent-encoded.
    fn send_mail_url(&self) -> Result<Url> {
        let mut url = Url::parse(GRAPH_USERS_BASE)?;
        url.path_segments_mut()
            .map_err(|_| NoticError::Notification("graph base url is not a base".to_string()))?
            .push(&self.sender)
            .push("sendMail");
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, to: &[String], subject: &str, html: &str) -> Result<()> {
        if to.is_empty() {
            return Ok(());
        }
        let token = self.fetch_token().await?;
        let payload = serde_json::json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": html },
                "toRecipients": to
                    .iter()
                    .map(|address| serde_json::json!({ "emailAddress": { "address": address } }))
                    .collect::<Vec<_>>(),
            },
            "saveToSentItems": true,
        });
        let response = self
            .client
            .post(self.send_mail_url()?)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;
        // Graph acknowledges a queued send with 202 and nothing else.
        if response.status() != StatusCode::ACCEPTED {
            return Err(NoticError::Notification(format!(
                "graph send failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
