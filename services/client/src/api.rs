//! Thin typed client for the backend's request/response endpoints.
//!
//! These are plain HTTP calls; debounce and supersession for the rapid
//! callers (editor keystrokes) live in
//! [`RequestCoordinator`](duet_core::coordinator::RequestCoordinator),
//! not here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat session summary from the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// One completion suggestion for the editor surface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub snippet: String,
}

#[derive(Serialize)]
struct SuggestionsRequest<'a> {
    code: &'a str,
    language: &'a str,
}

/// Client for the REST half of the backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Lists the user's chat sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let url = format!("{}/sessions", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("session list request failed")?;
        response
            .error_for_status()
            .context("session list request rejected")?
            .json()
            .await
            .context("session list response was not valid JSON")
    }

    /// Requests completion suggestions for the current editor contents.
    pub async fn fetch_suggestions(&self, code: &str, language: &str) -> Result<Vec<Suggestion>> {
        let url = format!("{}/suggestions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SuggestionsRequest { code, language })
            .send()
            .await
            .context("suggestions request failed")?;
        response
            .error_for_status()
            .context("suggestions request rejected")?
            .json()
            .await
            .context("suggestions response was not valid JSON")
    }
}
