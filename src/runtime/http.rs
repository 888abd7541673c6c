use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AutomationRuntime, CaptchaService, EmailService};
use crate::model::protocol::{ActionRequest, CssResult, GetCaptchaInfoResponse};

const USER_AGENT: &str = concat!("broker-scrub/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

async fn check(resp: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    if !resp.status().is_success() {
        anyhow::bail!("{what} failed: HTTP {}", resp.status());
    }
    Ok(resp)
}

/// Automation runtime reached over HTTP.
///
/// `POST {base}/actions` takes an [`ActionRequest`] and answers with a
/// result envelope; `POST {base}/load` takes `{"url": ...}`.
pub struct HttpRuntime {
    client: Client,
    base_url: String,
}

impl HttpRuntime {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }
}

#[derive(Serialize)]
struct LoadUrl<'a> {
    url: &'a str,
}

#[async_trait]
impl AutomationRuntime for HttpRuntime {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: &ActionRequest) -> anyhow::Result<CssResult> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, "actions"))
            .json(request)
            .send()
            .await?;
        let body: serde_json::Value = check(resp, "Action request").await?.json().await?;
        Ok(CssResult::from_value(&body)?)
    }

    async fn load_url(&self, url: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, "load"))
            .json(&LoadUrl { url })
            .send()
            .await?;
        check(resp, "Page load").await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptchaSubmitted {
    transaction_id: String,
}

#[derive(Deserialize)]
struct CaptchaSolution {
    #[serde(default)]
    token: Option<String>,
}

/// `POST {base}/submit` with the captcha info, `GET {base}/result/{id}`.
pub struct HttpCaptchaService {
    client: Client,
    base_url: String,
}

impl HttpCaptchaService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl CaptchaService for HttpCaptchaService {
    async fn submit_captcha_information(
        &self,
        info: &GetCaptchaInfoResponse,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, "submit"))
            .json(info)
            .send()
            .await?;
        let submitted: CaptchaSubmitted = check(resp, "Captcha submit").await?.json().await?;
        Ok(submitted.transaction_id)
    }

    async fn poll_captcha_solution(&self, transaction_id: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .get(endpoint(&self.base_url, &format!("result/{transaction_id}")))
            .send()
            .await?;
        let solution: CaptchaSolution = check(resp, "Captcha poll").await?.json().await?;
        Ok(solution.token)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateEmail<'a> {
    data_broker: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedEmail {
    email_address: String,
}

#[derive(Deserialize)]
struct ConfirmationLink {
    #[serde(default)]
    link: Option<String>,
}

/// `POST {base}/generate`, then `GET {base}/links?email=...`.
pub struct HttpEmailService {
    client: Client,
    base_url: String,
}

impl HttpEmailService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl EmailService for HttpEmailService {
    async fn email_for_broker(&self, broker_url: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, "generate"))
            .json(&GenerateEmail {
                data_broker: broker_url,
            })
            .send()
            .await?;
        let generated: GeneratedEmail = check(resp, "Email generation").await?.json().await?;
        Ok(generated.email_address)
    }

    async fn poll_confirmation_link(&self, email: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .get(endpoint(&self.base_url, "links"))
            .query(&[("email", email)])
            .send()
            .await?;
        let found: ConfirmationLink = check(resp, "Email poll").await?.json().await?;
        Ok(found.link)
    }
}
