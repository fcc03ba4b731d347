//! Application configuration.
//!
//! Every setting can come from a flag or an environment variable so the
//! OAuth redirect differs between local development and deployments without
//! a rebuild.

use crate::active_event::ActiveEventRule;
use gamenight_sync::supabase::SupabaseConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {0}; pass the flag or set the environment variable")]
    Missing(&'static str),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

#[derive(clap::Args, Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL
    #[arg(long, env = "GAMENIGHT_URL", default_value = "http://localhost:54321")]
    pub url: String,

    /// Public (anon) API key for the backend
    #[arg(long, env = "GAMENIGHT_ANON_KEY", default_value = "", hide_env_values = true)]
    pub anon_key: String,

    /// Where the OAuth provider sends the user back to
    #[arg(long, env = "GAMENIGHT_REDIRECT_URL", default_value = "http://localhost:5173/")]
    pub redirect_url: String,

    /// OAuth provider used for sign-in
    #[arg(long, env = "GAMENIGHT_OAUTH_PROVIDER", default_value = "discord")]
    pub provider: String,

    /// How tonight's event is picked from the schedule
    #[arg(long, value_enum, env = "GAMENIGHT_ACTIVE_EVENT_RULE", default_value_t = ActiveEventRule::SameDay)]
    pub active_event_rule: ActiveEventRule,

    /// Access token from a previous `login --callback`
    #[arg(long, env = "GAMENIGHT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh token from a previous `login --callback`
    #[arg(long, env = "GAMENIGHT_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Run against a seeded in-memory backend
    #[arg(long, global = true)]
    pub demo: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            redirect_url: "http://localhost:5173/".to_string(),
            provider: "discord".to_string(),
            active_event_rule: ActiveEventRule::default(),
            access_token: None,
            refresh_token: None,
            demo: false,
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Checks the settings needed to reach a real backend. Demo mode needs
    /// none of them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.demo {
            return Ok(());
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.anon_key.is_empty() {
            return Err(ConfigError::Missing("anon key (--anon-key / GAMENIGHT_ANON_KEY)"));
        }
        if self.redirect_url.is_empty() {
            return Err(ConfigError::Missing("redirect url (--redirect-url / GAMENIGHT_REDIRECT_URL)"));
        }
        Ok(())
    }

    /// Backend client settings.
    pub fn backend(&self) -> SupabaseConfig {
        SupabaseConfig::new(self.url.clone(), self.anon_key.clone())
    }

    /// OAuth settings handed to [`crate::Actions`].
    pub fn sign_in(&self) -> SignInSettings {
        SignInSettings {
            provider: self.provider.clone(),
            redirect_url: self.redirect_url.clone(),
        }
    }
}

/// OAuth provider and the URL it returns to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInSettings {
    pub provider: String,
    pub redirect_url: String,
}

impl Default for SignInSettings {
    fn default() -> Self {
        AppConfig::default().sign_in()
    }
}
