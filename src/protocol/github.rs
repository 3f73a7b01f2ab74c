//! GitHub organization audit log client
//!
//! `GET /orgs/{org}/audit-log` returns a JSON array of events; the next page
//! is announced in the `Link` header as a URL carrying an `after` cursor.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::config::SourceConfig;
use crate::error::{ExportError, Result};
use crate::pipeline::{AuditPage, AuditQuery, AuditRecord, AuditSource, Cursor};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Audit source reading from the GitHub REST API
pub struct GitHubAuditClient {
    http: Client,
    endpoint: Url,
    token: SecretString,
}

impl GitHubAuditClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let endpoint = audit_log_url(&config.api_url, &config.org)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_JSON));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl AuditSource for GitHubAuditClient {
    async fn fetch_page(&self, query: &AuditQuery, after: Option<&Cursor>) -> Result<AuditPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("phrase", query.phrase.clone()),
            ("include", query.include.clone()),
            ("order", query.order.as_str().to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if let Some(cursor) = after {
            params.push(("after", cursor.as_str().to_string()));
        }

        let response = self
            .http
            .get(self.endpoint.clone())
            .header(USER_AGENT, concat!("audit-export/", env!("CARGO_PKG_VERSION")))
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_cursor);
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(source_error(status, &body));
        }

        let records: Vec<AuditRecord> = serde_json::from_slice(&body)?;
        debug!(
            "Received {} audit entries (more: {})",
            records.len(),
            next.is_some()
        );

        Ok(AuditPage { records, next })
    }
}

fn audit_log_url(api_url: &str, org: &str) -> Result<Url> {
    let raw = format!("{}/orgs/{}/audit-log", api_url.trim_end_matches('/'), org);
    Url::parse(&raw).map_err(|e| ExportError::Config(format!("invalid audit log URL {}: {}", raw, e)))
}

/// Pull the `after` cursor out of the `rel="next"` entry of a `Link` header
pub fn next_cursor(link_header: &str) -> Option<Cursor> {
    link_header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim();
                param == "rel=\"next\"" || param == "rel=next"
            });
            is_next.then_some(target)
        })
        .filter_map(|target| {
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            Url::parse(target).ok()
        })
        .find_map(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "after")
                .and_then(|(_, value)| Cursor::new(value.into_owned()))
        })
}

fn source_error(status: StatusCode, body: &[u8]) -> ExportError {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });
    ExportError::Source {
        status: status.as_u16(),
        message,
    }
}
