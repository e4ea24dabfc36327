//! services/api/src/adapters/evidence.rs
//!
//! This module contains the adapter for the external search/evidence
//! provider. It implements the `EvidenceService` port from the `core` crate.
//!
//! The provider returns raw mention candidates; validation into domain
//! sightings happens item by item at the call site, so one malformed
//! candidate never fails a batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use slanglab_core::ports::{EvidenceService, PortError, PortResult, SightingCandidate};
use std::time::Duration;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `EvidenceService` against an HTTP mention-search API.
#[derive(Clone)]
pub struct HttpEvidenceAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEvidenceAdapter {
    /// Creates a new `HttpEvidenceAdapter`. The timeout bounds every
    /// provider round-trip.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct MentionWire {
    source: Option<String>,
    url: Option<String>,
    snippet: Option<String>,
    score: Option<i64>,
    observed_at: Option<DateTime<Utc>>,
}

impl MentionWire {
    fn to_candidate(self) -> SightingCandidate {
        SightingCandidate {
            source: self.source,
            url: self.url,
            snippet: self.snippet,
            score: self.score,
            observed_at: self.observed_at,
        }
    }
}

#[derive(Deserialize)]
struct MentionsResponse {
    mentions: Vec<MentionWire>,
}

//=========================================================================================
// `EvidenceService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EvidenceService for HttpEvidenceAdapter {
    async fn find_mentions(&self, phrase: &str) -> PortResult<Vec<SightingCandidate>> {
        let mut request = self
            .client
            .get(format!("{}/mentions", self.base_url))
            .query(&[("q", phrase)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                PortError::Unavailable(e.to_string())
            } else {
                PortError::Unexpected(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(PortError::Unavailable(format!(
                "evidence provider returned {}",
                response.status()
            )));
        }

        let body: MentionsResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(body.mentions.into_iter().map(MentionWire::to_candidate).collect())
    }
}
