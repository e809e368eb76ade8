//! HTTP memory backend
//!
//! Talks to a memory service over JSON/HTTP. Optional surfaces that are
//! disabled in config short-circuit without a request; a 404 or 501 from an
//! optional surface is reported as unsupported.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{MemoryBackend, SearchScope};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult, RecollectError, Result};
use crate::memory::types::{ChatId, ConversationTurn, HistoryTurn, RawMemoryRecord};

/// Memory backend reached over HTTP
#[derive(Debug)]
pub struct HttpMemoryBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    config: BackendConfig,
}

#[derive(Debug, Serialize)]
struct ContextRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(flatten)]
    scope: &'a SearchScope,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct AutoIngestRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    chat_id: String,
}

/// A list either returned bare or wrapped in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "results", alias = "history", alias = "conversations")]
        memories: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { memories: items } => items,
        }
    }
}

impl HttpMemoryBackend {
    /// Create a backend client from config.
    ///
    /// Fails when the base URL is invalid or when `api_key_env` names an
    /// unset variable.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            RecollectError::Config(format!("Invalid backend URL '{}': {e}", config.base_url))
        })?;
        // Endpoints are joined relative to the base path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let api_key = match &config.api_key_env {
            Some(var) => Some(env::var(var).map_err(|_| {
                RecollectError::Config(format!("API key env var '{var}' not set"))
            })?),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecollectError::Config(format!("Failed to build HTTP client: {e}")))?;

        info!(
            "HttpMemoryBackend initialized: {} (indexing_agent: {})",
            base_url, config.indexing_agent
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Unavailable(format!("Invalid endpoint {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Unavailable(e.to_string())
            }
        })
    }

    /// Send a request for a required surface and decode the body
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let response = self.send(request).await?;
        decode(response).await
    }

    /// Send a request for an optional surface; 404 and 501 mean unsupported
    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        surface: &'static str,
        request: RequestBuilder,
    ) -> BackendResult<T> {
        let response = self.send(request).await?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!("Backend does not provide {}", surface);
            return Err(BackendError::Unsupported(surface));
        }
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl MemoryBackend for HttpMemoryBackend {
    async fn retrieve_context(
        &self,
        query: &str,
        limit: usize,
    ) -> BackendResult<Vec<RawMemoryRecord>> {
        let url = self.endpoint("context/retrieve")?;
        let request = self.client.post(url).json(&ContextRequest { query, limit });
        let listing: Listing<RawMemoryRecord> = self.fetch(request).await?;
        Ok(listing.into_vec())
    }

    async fn conversation_history(&self, limit: usize) -> BackendResult<Vec<HistoryTurn>> {
        let url = self.endpoint("conversations/history")?;
        let request = self.client.get(url).query(&[("limit", limit)]);
        let listing: Listing<HistoryTurn> = self.fetch(request).await?;
        Ok(listing.into_vec())
    }

    async fn essential_conversations(&self, limit: usize) -> BackendResult<Vec<RawMemoryRecord>> {
        let url = self.endpoint("conversations/essential")?;
        let request = self.client.get(url).query(&[("limit", limit)]);
        let listing: Listing<RawMemoryRecord> = self.fetch(request).await?;
        Ok(listing.into_vec())
    }

    async fn execute_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> BackendResult<Vec<RawMemoryRecord>> {
        if !self.config.search_enabled {
            return Err(BackendError::Unsupported("search"));
        }
        let url = self.endpoint("search")?;
        let request = self.client.post(url).json(&SearchRequest {
            query,
            scope,
            limit,
        });
        let listing: Listing<RawMemoryRecord> = self.fetch_optional("search", request).await?;
        Ok(listing.into_vec())
    }

    async fn auto_ingest_context(&self, query: &str) -> BackendResult<Vec<RawMemoryRecord>> {
        if !self.config.auto_ingest_enabled {
            return Err(BackendError::Unsupported("auto-ingest"));
        }
        let url = self.endpoint("context/auto")?;
        let request = self.client.post(url).json(&AutoIngestRequest { query });
        let listing: Listing<RawMemoryRecord> =
            self.fetch_optional("auto-ingest", request).await?;
        Ok(listing.into_vec())
    }

    async fn record_conversation(&self, turn: &ConversationTurn) -> BackendResult<ChatId> {
        let url = self.endpoint("conversations")?;
        let request = self.client.post(url).json(turn);
        let response: RecordResponse = self.fetch(request).await?;
        Ok(ChatId::new(response.chat_id))
    }

    fn has_indexing_agent(&self) -> bool {
        self.config.indexing_agent
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
