//! Certificate issuance collaborator.
//!
//! When CERTIFICATE_SERVICE_URL is set we ask the external service to render
//! and register the certificate; otherwise (or when the call fails) we mint
//! a local identifier so course completion still credits the user. The
//! engine only consumes the returned certificate id.
//!
//! NOTE: we never log the API key.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct CertificateClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub api_key: Option<String>,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
  #[serde(rename = "userId")]
  user_id: &'a str,
  #[serde(rename = "courseId")]
  course_id: &'a str,
}

#[derive(Deserialize)]
struct IssueResponse {
  #[serde(rename = "certificateId")]
  certificate_id: String,
}

impl CertificateClient {
  /// Construct the client if we find CERTIFICATE_SERVICE_URL; otherwise None.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("CERTIFICATE_SERVICE_URL").ok()?;
    let api_key = std::env::var("CERTIFICATE_SERVICE_KEY").ok();

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .ok()?;

    Some(Self { client, base_url, api_key })
  }

  /// Request a certificate for a finished course. Returns the remote
  /// certificate id.
  #[instrument(level = "info", skip(self), fields(%user_id, %course_id))]
  pub async fn issue(&self, user_id: &str, course_id: &str) -> Result<String, reqwest::Error> {
    let url = format!("{}/certificates", self.base_url.trim_end_matches('/'));
    let mut req = self
      .client
      .post(&url)
      .header(CONTENT_TYPE, "application/json")
      .json(&IssueRequest { user_id, course_id });
    if let Some(key) = &self.api_key {
      req = req.header(AUTHORIZATION, format!("Bearer {}", key));
    }
    let resp = req.send().await?.error_for_status()?;
    let out: IssueResponse = resp.json().await?;
    info!(target: "progress", %user_id, %course_id, certificate_id = %out.certificate_id, "Certificate issued remotely");
    Ok(out.certificate_id)
  }
}

/// Issuer used by the engine: remote when configured, local UUID fallback
/// otherwise so the completion path never fails on the collaborator.
#[derive(Clone, Default)]
pub struct CertificateIssuer {
  pub remote: Option<CertificateClient>,
}

impl CertificateIssuer {
  pub fn from_env() -> Self {
    let remote = CertificateClient::from_env();
    match &remote {
      Some(c) => info!(target: "aula_backend", base_url = %c.base_url, "Certificate service enabled"),
      None => info!(target: "aula_backend", "Certificate service disabled (no CERTIFICATE_SERVICE_URL); issuing local ids"),
    }
    Self { remote }
  }

  /// Local-only issuer, used in tests and as the configured fallback.
  pub fn local() -> Self {
    Self { remote: None }
  }

  pub async fn issue(&self, user_id: &str, course_id: &str) -> String {
    if let Some(remote) = &self.remote {
      match remote.issue(user_id, course_id).await {
        Ok(id) => return id,
        Err(e) => {
          error!(target: "progress", %user_id, %course_id, error = %e, "Remote certificate issuance failed; minting local id");
        }
      }
    }
    format!("cert-{}", Uuid::new_v4())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn local_issuer_mints_unique_ids() {
    let issuer = CertificateIssuer::local();
    let a = issuer.issue("u1", "c1").await;
    let b = issuer.issue("u1", "c1").await;
    assert!(a.starts_with("cert-"));
    assert_ne!(a, b);
  }
}
