//! GoTrue auth client.
//!
//! OAuth sign-in is browser based: [`GoTrueAuth::sign_in_with_oauth`] only
//! builds the authorize URL. The provider redirects back to the configured
//! URL with the session tokens in the fragment, which the caller hands to
//! [`GoTrueAuth::set_session`].

use super::{SupabaseConfig, TokenStore};
use crate::client::{AuthEvent, AuthStateChange, AuthStateListener, Identity};
use crate::error::{SyncError, SyncResult};
use gamenight_types::PlayerId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tokens of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: PlayerId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl From<GoTrueUser> for Identity {
    fn from(user: GoTrueUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.user_metadata.full_name.or(user.user_metadata.name),
            avatar_url: user.user_metadata.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user: Option<GoTrueUser>,
}

/// Session management against GoTrue.
pub struct GoTrueAuth {
    config: SupabaseConfig,
    client: Client,
    tokens: TokenStore,
    user: Arc<StdRwLock<Option<Identity>>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl GoTrueAuth {
    pub fn new(config: SupabaseConfig, tokens: TokenStore) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            config,
            client,
            tokens,
            user: Arc::new(StdRwLock::new(None)),
            events,
        })
    }

    /// URL of the provider's consent page.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> String {
        format!(
            "{}/authorize?provider={}&redirect_to={}",
            self.config.auth_url(),
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to)
        )
    }

    pub async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> SyncResult<String> {
        if provider.trim().is_empty() {
            return Err(SyncError::Auth("no OAuth provider given".to_string()));
        }
        debug!(%provider, "starting OAuth sign-in");
        Ok(self.authorize_url(provider, redirect_to))
    }

    /// Validates `access_token` by loading its user, then makes it the
    /// current session.
    pub async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> SyncResult<Identity> {
        let identity = self.fetch_user(access_token).await?;
        *self.tokens.write().await = Some(SessionTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        });
        self.publish(AuthEvent::SignedIn, Some(identity.clone()));
        info!(user = %identity.id, "signed in");
        Ok(identity)
    }

    /// Restores a saved session. When the access token is rejected and a
    /// refresh token is at hand, the session is refreshed instead; read the
    /// new tokens back with [`GoTrueAuth::tokens`].
    pub async fn restore_session(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> SyncResult<Identity> {
        match self.set_session(access_token, refresh_token).await {
            Err(SyncError::Auth(reason)) => match refresh_token {
                Some(refresh_token) => {
                    debug!(%reason, "saved access token rejected");
                    self.refresh_with(refresh_token.to_string()).await
                }
                None => Err(SyncError::Auth(reason)),
            },
            result => result,
        }
    }

    /// Exchanges the stored refresh token for a new access token.
    pub async fn refresh_session(&self) -> SyncResult<Identity> {
        let refresh_token = {
            let guard = self.tokens.read().await;
            guard
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or_else(|| SyncError::Auth("no refresh token available".to_string()))?
        };
        self.refresh_with(refresh_token).await
    }

    /// Tokens of the current session, if any.
    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().await.clone()
    }

    async fn refresh_with(&self, refresh_token: String) -> SyncResult<Identity> {
        debug!("refreshing session");
        let response = self
            .client
            .post(format!("{}/token", self.config.auth_url()))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("token refresh failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse token response: {e}")))?;

        let identity = match token_response.user {
            Some(user) => Identity::from(user),
            None => self.fetch_user(&token_response.access_token).await?,
        };
        *self.tokens.write().await = Some(SessionTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
        });
        self.publish(AuthEvent::TokenRefreshed, Some(identity.clone()));
        info!(user = %identity.id, "session refreshed");
        Ok(identity)
    }

    /// Revokes the session server side and clears it locally. The local
    /// session is cleared even when the server call fails.
    pub async fn sign_out(&self) -> SyncResult<()> {
        let access_token = self
            .tokens
            .write()
            .await
            .take()
            .map(|tokens| tokens.access_token);

        let result = match access_token {
            Some(access_token) => self.logout(&access_token).await,
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("server sign-out failed: {e}");
        }
        self.publish(AuthEvent::SignedOut, None);
        info!("signed out");
        result
    }

    pub fn on_auth_state_change(&self) -> AuthStateListener {
        AuthStateListener::new(self.current_user(), self.events.subscribe())
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<Identity> {
        match self.user.read() {
            Ok(user) => user.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> SyncResult<Identity> {
        let response = self
            .client
            .get(format!("{}/user", self.config.auth_url()))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("user lookup failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("session rejected: {error}")));
        }

        let user: GoTrueUser = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse user: {e}")))?;
        Ok(user.into())
    }

    async fn logout(&self, access_token: &str) -> SyncResult<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.config.auth_url()))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("sign-out failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("sign-out failed: {error}")));
        }
        Ok(())
    }

    fn publish(&self, event: AuthEvent, user: Option<Identity>) {
        match self.user.write() {
            Ok(mut current) => *current = user.clone(),
            Err(poisoned) => *poisoned.into_inner() = user.clone(),
        }
        // No listeners is fine.
        let _ = self.events.send(AuthStateChange { event, user });
    }
}

/// Extracts `(access_token, refresh_token)` from the URL the provider
/// redirected to (`...#access_token=..&refresh_token=..`).
pub fn parse_redirect_fragment(url: &str) -> Option<(String, Option<String>)> {
    let (_, fragment) = url.split_once('#')?;
    let mut access_token = None;
    let mut refresh_token = None;
    for pair in fragment.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value).ok()?.into_owned();
        match key {
            "access_token" => access_token = Some(value),
            "refresh_token" => refresh_token = Some(value),
            _ => {}
        }
    }
    access_token
        .filter(|token| !token.is_empty())
        .map(|token| (token, refresh_token))
}
