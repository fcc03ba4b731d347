//! Client side of a Supabase-style hosted platform.
//!
//! Three services sit behind one project URL:
//! - PostgREST (`/rest/v1`) for queries and writes
//! - GoTrue (`/auth/v1`) for OAuth sign-in and sessions
//! - Realtime (`/realtime/v1/websocket`) for row change notifications
//!
//! [`SupabaseClient`] bundles the three and implements [`RemoteDataClient`]
//! and [`AuthClient`]. All three share the session's access token.

pub mod auth;
pub mod realtime;
pub mod rest;

pub use auth::{GoTrueAuth, SessionTokens, parse_redirect_fragment};
pub use realtime::{PhoenixMessage, RealtimeClient};
pub use rest::RestClient;

use crate::client::{
    AuthClient, AuthStateListener, Identity, RemoteDataClient, SelectQuery, Subscription,
};
use crate::error::SyncResult;
use async_trait::async_trait;
use gamenight_types::{Filter, SubscriptionScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Access and refresh tokens of the current session, shared by all
/// services.
pub type TokenStore = Arc<RwLock<Option<SessionTokens>>>;

/// Connection settings for a hosted project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL (e.g. `https://xyz.supabase.co`).
    pub url: String,
    /// Public anonymous API key.
    pub anon_key: String,
    /// Database schema the tables live in.
    pub schema: String,
    /// Timeout for REST and auth requests (seconds).
    pub request_timeout_secs: u64,
    /// How long to wait for a channel join to be acknowledged (seconds).
    pub subscribe_timeout_secs: u64,
    /// Realtime heartbeat period (seconds).
    pub heartbeat_interval_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            schema: "public".to_string(),
            request_timeout_secs: 30,
            subscribe_timeout_secs: 10,
            heartbeat_interval_secs: 30,
        }
    }
}

impl SupabaseConfig {
    /// Config for `url` with the given anon key and default timeouts.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Default::default()
        }
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// PostgREST root.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base())
    }

    /// GoTrue root.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.base())
    }

    /// Realtime websocket endpoint.
    pub fn realtime_url(&self) -> String {
        let base = self.base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            urlencoding::encode(&self.anon_key)
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// The three platform services behind one project.
pub struct SupabaseClient {
    rest: RestClient,
    auth: GoTrueAuth,
    realtime: RealtimeClient,
}

impl SupabaseClient {
    /// Creates clients for every service. No connection is made until the
    /// first request.
    pub fn new(config: SupabaseConfig) -> SyncResult<Self> {
        let tokens: TokenStore = Arc::new(RwLock::new(None));
        Ok(Self {
            rest: RestClient::new(config.clone(), tokens.clone())?,
            auth: GoTrueAuth::new(config.clone(), tokens.clone())?,
            realtime: RealtimeClient::new(config, tokens),
        })
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn auth(&self) -> &GoTrueAuth {
        &self.auth
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    /// Closes the realtime socket.
    pub async fn shutdown(&self) {
        self.realtime.disconnect().await;
    }
}

#[async_trait]
impl RemoteDataClient for SupabaseClient {
    async fn select(&self, query: SelectQuery) -> SyncResult<Vec<Value>> {
        self.rest.select(&query).await
    }

    async fn insert(&self, table: &str, row: Value) -> SyncResult<()> {
        self.rest.insert(table, &row).await
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> SyncResult<()> {
        self.rest.update(table, &patch, filters).await
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> SyncResult<()> {
        self.rest.upsert(table, &row, on_conflict).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> SyncResult<()> {
        self.rest.delete(table, filters).await
    }

    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        self.realtime.subscribe(scope).await
    }

    async fn unsubscribe(&self, subscription: Subscription) -> SyncResult<()> {
        self.realtime.unsubscribe(subscription).await
    }
}

#[async_trait]
impl AuthClient for SupabaseClient {
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> SyncResult<String> {
        self.auth.sign_in_with_oauth(provider, redirect_to).await
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> SyncResult<Identity> {
        self.auth.set_session(access_token, refresh_token).await
    }

    async fn sign_out(&self) -> SyncResult<()> {
        self.auth.sign_out().await
    }

    fn on_auth_state_change(&self) -> AuthStateListener {
        self.auth.on_auth_state_change()
    }
}
