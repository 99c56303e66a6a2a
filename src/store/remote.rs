// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote persistence through the GitHub contents API.
//!
//! The attendance document is a regular file inside a Git repository. Reads
//! go through `GET /repos/{owner}/{repo}/contents/{path}`, which hands back
//! the base64 encoded file along with its blob SHA. Writes go through
//! `PUT` on the same URL and create a new commit. The blob SHA is passed
//! back on every update, so the API refuses the write if the file moved on
//! in the meantime.
//!
//! Files above one megabyte come back without inline content. Those are
//! fetched as raw bytes from `GET /repos/{owner}/{repo}/git/blobs/{sha}`
//! using the SHA of the same response, so content and token always match.
//!
//! # See Also
//!
//! 1. [GitHub REST API - Repository contents](https://docs.github.com/en/rest/repos/contents)
//! 2. [GitHub REST API - Git blobs](https://docs.github.com/en/rest/git/blobs)

use crate::{
    config::RemoteSettings,
    model::{AttendanceDocument, VersionToken},
    store::{parse_document, DocumentStore, Loaded, Result, StoreError},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ACCEPT: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Attendance document kept in a remote Git repository.
#[derive(Clone, Debug)]
pub struct RemoteStore {
    client: Client,
    api_url: String,
    repository: Option<String>,
    path: String,
    branch: Option<String>,
    token: Option<String>,
    commit_message: String,
}

impl RemoteStore {
    /// Construct new remote store from remote settings.
    ///
    /// Missing repository or credential does not fail construction. Such a
    /// store simply refuses to write, see [`DocumentStore::verify`].
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(settings.timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            repository: settings.repository.clone().filter(|r| !r.is_empty()),
            path: settings.path.trim_start_matches('/').to_string(),
            branch: settings.branch.clone().filter(|b| !b.is_empty()),
            token: settings.token.clone().filter(|t| !t.is_empty()),
            commit_message: settings.commit_message.clone(),
        })
    }

    fn repository(&self) -> Result<&str> {
        self.repository
            .as_deref()
            .ok_or(StoreError::ConfigurationMissing { what: "repository" })
    }

    fn credential(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or(StoreError::ConfigurationMissing { what: "token" })
    }

    fn contents_url(&self) -> Result<String> {
        Ok(format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            self.repository()?,
            self.path
        ))
    }

    fn blob_url(&self, sha: &str) -> Result<String> {
        Ok(format!(
            "{}/repos/{}/git/blobs/{sha}",
            self.api_url,
            self.repository()?
        ))
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request
            .bearer_auth(self.credential()?)
            .header(reqwest::header::ACCEPT, ACCEPT))
    }

    /// Fetch raw contents of target blob.
    async fn fetch_blob(&self, sha: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.blob_url(sha)?)
            .bearer_auth(self.credential()?)
            .header(reqwest::header::ACCEPT, ACCEPT_RAW)
            .send()
            .await
            .map_err(StoreError::Unreachable)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => return Err(StoreError::Unauthenticated),
            StatusCode::FORBIDDEN => return Err(self.denied()),
            _ => return Err(failure(response).await),
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        Ok(bytes.to_vec())
    }

    fn denied(&self) -> StoreError {
        StoreError::Forbidden {
            repository: self.repository.clone().unwrap_or_default(),
        }
    }
}

impl DocumentStore for RemoteStore {
    /// Fetch attendance document from the remote repository.
    ///
    /// A document that does not exist yet yields an empty document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ConfigurationMissing`] if coordinates are absent.
    /// - Return [`StoreError::Unreachable`] if the API cannot be reached.
    /// - Return [`StoreError::Unauthenticated`] if the credential is rejected.
    /// - Return [`StoreError::Forbidden`] if the credential lacks access.
    /// - Return [`StoreError::Malformed`] if the document cannot be decoded.
    /// - Return [`StoreError::Transport`] for any other failure status.
    #[instrument(skip(self), fields(repository = ?self.repository, path = %self.path), level = "debug")]
    async fn load(&self) -> Result<Loaded> {
        let mut request = self.authorize(self.client.get(self.contents_url()?))?;
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch)]);
        }

        let response = request.send().await.map_err(StoreError::Unreachable)?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                debug!("no attendance document in remote repository yet");
                return Ok(Loaded::empty());
            }
            StatusCode::UNAUTHORIZED => return Err(StoreError::Unauthenticated),
            StatusCode::FORBIDDEN => return Err(self.denied()),
            _ => return Err(failure(response).await),
        }

        let file: ContentsFile = response
            .json()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        let document = if file.is_inline() {
            decode(&file.content)
        } else {
            debug!(sha = %file.sha, "document content not inline, fetching blob");
            parse_document(&self.fetch_blob(&file.sha).await?)
        };
        let document = document.inspect_err(|error| {
            warn!(%error, sha = %file.sha, "cannot decode attendance document");
        })?;

        Ok(Loaded {
            document,
            token: Some(VersionToken::new(file.sha)),
        })
    }

    /// Commit attendance document to the remote repository.
    ///
    /// Creates the file when `expected` is absent, updates it otherwise.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ConfigurationMissing`] if coordinates are absent.
    /// - Return [`StoreError::Conflict`] if `expected` is stale.
    /// - Return [`StoreError::Unauthenticated`] if the credential is rejected.
    /// - Return [`StoreError::Forbidden`] if the credential lacks access.
    /// - Return [`StoreError::Transport`] for any other delivery failure.
    #[instrument(skip(self, document), fields(repository = ?self.repository, path = %self.path), level = "debug")]
    async fn store(
        &self,
        document: &AttendanceDocument,
        expected: Option<&VersionToken>,
    ) -> Result<Option<VersionToken>> {
        let body = UpdateRequest {
            message: self.commit_message.as_str(),
            content: STANDARD.encode(document.to_string()),
            sha: expected.map(VersionToken::as_str),
            branch: self.branch.as_deref(),
        };

        let response = self
            .authorize(self.client.put(self.contents_url()?))?
            .json(&body)
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::CONFLICT => return Err(StoreError::Conflict),
            StatusCode::UNAUTHORIZED => return Err(StoreError::Unauthenticated),
            // INVARIANT: GitHub hides repositories the credential cannot see behind 404.
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => return Err(self.denied()),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let error = failure(response).await;
                return match error {
                    StoreError::Transport(message) if message.contains("sha") => {
                        Err(StoreError::Conflict)
                    }
                    error => Err(error),
                };
            }
            _ => return Err(failure(response).await),
        }

        let update: UpdateResponse = response
            .json()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        info!(sha = %update.content.sha, "attendance document committed");

        Ok(Some(VersionToken::new(update.content.sha)))
    }

    fn verify(&self) -> Result<()> {
        self.repository()?;
        self.credential()?;
        Ok(())
    }

    fn is_versioned(&self) -> bool {
        true
    }
}

/// Decode base64 file content as served by the contents API.
fn decode(content: &str) -> Result<AttendanceDocument> {
    // INVARIANT: The API wraps base64 content at 60 columns.
    let compact: String = content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|error| StoreError::Malformed(error.to_string()))?;
    parse_document(&bytes)
}

async fn failure(response: Response) -> StoreError {
    let status = response.status();
    let message = response
        .json::<ApiMessage>()
        .await
        .map(|body| body.message)
        .unwrap_or_default();

    StoreError::Transport(format!("{status}: {message}"))
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: String,
}

impl ContentsFile {
    /// Whether the response carries the file contents itself.
    fn is_inline(&self) -> bool {
        self.encoding.as_deref() != Some("none") && !self.content.trim().is_empty()
    }
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    content: UpdatedFile,
}

#[derive(Debug, Deserialize)]
struct UpdatedFile {
    sha: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentMark;
    use pretty_assertions::assert_eq;

    fn settings() -> RemoteSettings {
        RemoteSettings {
            repository: Some("school/records".into()),
            token: Some("secret".into()),
            ..RemoteSettings::default()
        }
    }

    #[test]
    fn decode_wrapped_content() -> anyhow::Result<()> {
        let encoded = STANDARD.encode(r#"{"attendance":{"2024-01-01_1":[{"name":"Alice","present":true}]}}"#);
        let (head, tail) = encoded.split_at(20);
        let wrapped = format!("{head}\n{tail}\n");

        let result = decode(&wrapped)?;
        assert_eq!(result.slot("2024-01-01_1"), [StudentMark::new("Alice", true)]);

        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("!!!"), Err(StoreError::Malformed(_))));
        assert!(matches!(
            decode(&STANDARD.encode("not json")),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_file_is_not_inline() -> anyhow::Result<()> {
        let file: ContentsFile =
            serde_json::from_str(r#"{"sha": "abc", "encoding": "none", "content": ""}"#)?;
        assert!(!file.is_inline());

        let file: ContentsFile = serde_json::from_str(r#"{"sha": "abc", "content": ""}"#)?;
        assert!(!file.is_inline());

        let file: ContentsFile =
            serde_json::from_str(r#"{"sha": "abc", "encoding": "base64", "content": "e30=\n"}"#)?;
        assert!(file.is_inline());

        Ok(())
    }

    #[test]
    fn contents_url_layout() -> anyhow::Result<()> {
        let store = RemoteStore::new(&RemoteSettings {
            api_url: "https://github.example.com/api/v3/".into(),
            path: "/data/attendance.json".into(),
            ..settings()
        })?;

        assert_eq!(
            store.contents_url()?,
            "https://github.example.com/api/v3/repos/school/records/contents/data/attendance.json"
        );

        Ok(())
    }

    #[test]
    fn verify_reports_missing_coordinates() -> anyhow::Result<()> {
        let store = RemoteStore::new(&settings())?;
        assert!(store.verify().is_ok());
        assert!(store.is_versioned());

        let store = RemoteStore::new(&RemoteSettings {
            repository: None,
            ..settings()
        })?;
        assert!(matches!(
            store.verify(),
            Err(StoreError::ConfigurationMissing { what: "repository" })
        ));

        let store = RemoteStore::new(&RemoteSettings {
            token: Some(String::new()),
            ..settings()
        })?;
        assert!(matches!(
            store.verify(),
            Err(StoreError::ConfigurationMissing { what: "token" })
        ));

        Ok(())
    }
}
