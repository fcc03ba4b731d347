//! PostgREST client.
//!
//! Filters travel as query parameters (`event_id=eq.3`), rows as JSON
//! bodies. Writes ask for `return=minimal`; the live watchers learn about
//! the result from change events.

use super::{SupabaseConfig, TokenStore};
use crate::client::SelectQuery;
use crate::error::{SyncError, SyncResult};
use gamenight_types::Filter;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Query and write access to the project's tables.
pub struct RestClient {
    config: SupabaseConfig,
    client: Client,
    tokens: TokenStore,
}

impl RestClient {
    pub fn new(config: SupabaseConfig, tokens: TokenStore) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    /// The session's access token, or the anon key when signed out.
    async fn bearer(&self) -> String {
        match self.tokens.read().await.as_ref() {
            Some(tokens) => tokens.access_token.clone(),
            None => self.config.anon_key.clone(),
        }
    }

    async fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self.bearer().await;
        let profile = if method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };
        self.client
            .request(method, format!("{}/{table}", self.config.rest_url()))
            .header("apikey", &self.config.anon_key)
            .header(profile, &self.config.schema)
            .bearer_auth(bearer)
    }

    pub async fn select(&self, query: &SelectQuery) -> SyncResult<Vec<Value>> {
        let mut params = vec![("select".to_string(), query.columns.clone())];
        params.extend(query.filters.iter().map(Filter::query_pair));
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        debug!(table = %query.table, filters = query.filters.len(), "select");

        let response = self
            .request(Method::GET, &query.table)
            .await
            .query(&params)
            .send()
            .await?;
        let response = check(response).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse rows: {e}")))
    }

    pub async fn insert(&self, table: &str, row: &Value) -> SyncResult<()> {
        debug!(%table, "insert");
        let response = self
            .request(Method::POST, table)
            .await
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check(response).await.map(drop)
    }

    pub async fn update(&self, table: &str, patch: &Value, filters: &[Filter]) -> SyncResult<()> {
        debug!(%table, filters = filters.len(), "update");
        let params: Vec<_> = filters.iter().map(Filter::query_pair).collect();
        let response = self
            .request(Method::PATCH, table)
            .await
            .header("Prefer", "return=minimal")
            .query(&params)
            .json(patch)
            .send()
            .await?;
        check(response).await.map(drop)
    }

    pub async fn upsert(&self, table: &str, row: &Value, on_conflict: &[&str]) -> SyncResult<()> {
        debug!(%table, ?on_conflict, "upsert");
        let mut request = self
            .request(Method::POST, table)
            .await
            .header("Prefer", "resolution=merge-duplicates,return=minimal");
        if !on_conflict.is_empty() {
            request = request.query(&[("on_conflict", on_conflict.join(","))]);
        }
        let response = request.json(row).send().await?;
        check(response).await.map(drop)
    }

    pub async fn delete(&self, table: &str, filters: &[Filter]) -> SyncResult<()> {
        debug!(%table, filters = filters.len(), "delete");
        let params: Vec<_> = filters.iter().map(Filter::query_pair).collect();
        let response = self
            .request(Method::DELETE, table)
            .await
            .query(&params)
            .send()
            .await?;
        check(response).await.map(drop)
    }
}

/// Maps a non-success response to [`SyncError::Query`], keeping the
/// PostgREST error code when the body has one.
async fn check(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<PostgrestError>(&body) {
        Ok(error) => {
            let message = match (error.message, error.details) {
                (Some(message), Some(details)) => format!("{message} ({details})"),
                (Some(message), None) => message,
                (None, Some(details)) => details,
                (None, None) => body.clone(),
            };
            (error.code.unwrap_or_else(|| status.as_u16().to_string()), message)
        }
        Err(_) => (status.as_u16().to_string(), body),
    };
    Err(SyncError::Query { code, message })
}
