// components/cloud_client/src/token.rs
//! Bearer tokens for the vendor API families

use crate::error::TokenError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tokio::process::Command;

pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
pub const APPLICATION_SCOPE: &str = "https://apps.azureiotcentral.com/.default";

/// Seconds before expiry at which a cached token is refreshed
const REFRESH_MARGIN_SECS: i64 = 300;

/// OAuth scope a token is requested for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiScope(String);

impl ApiScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn management() -> Self {
        Self::new(MANAGEMENT_SCOPE)
    }

    pub fn application() -> Self {
        Self::new(APPLICATION_SCOPE)
    }

    /// Analytics clusters are their own audience
    pub fn analytics(cluster_uri: &str) -> Self {
        Self(format!("{}/.default", cluster_uri.trim_end_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Bearer token valid for `scope`
    async fn scoped_token(&self, scope: &ApiScope) -> Result<String, TokenError>;
}

/// Hands out the same token for every scope
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn scoped_token(&self, scope: &ApiScope) -> Result<String, TokenError> {
        if self.token.is_empty() {
            return Err(TokenError::Unavailable {
                scope: scope.to_string(),
                reason: "no token configured".to_string(),
            });
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_on: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(rename = "expires_on")]
    expires_on: Option<serde_json::Value>,
}

/// Tokens from `az account get-access-token`, cached per scope
pub struct AzCliTokenProvider {
    program: String,
    cache: Mutex<HashMap<ApiScope, CachedToken>>,
}

impl AzCliTokenProvider {
    pub fn new() -> Self {
        Self::with_program("az")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, scope: &ApiScope, now: i64) -> Option<String> {
        let cache = self.cache.lock();
        cache
            .get(scope)
            .filter(|cached| cached.expires_on - REFRESH_MARGIN_SECS > now)
            .map(|cached| cached.token.clone())
    }

    async fn request(&self, scope: &ApiScope) -> Result<CachedToken, TokenError> {
        let output = Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--scope",
                scope.as_str(),
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|source| TokenError::CommandFailed {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TokenError::Unavailable {
                scope: scope.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_cli_token(&output.stdout)
    }
}

impl Default for AzCliTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for AzCliTokenProvider {
    async fn scoped_token(&self, scope: &ApiScope) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = self.cached(scope, now) {
            return Ok(token);
        }

        tracing::debug!(%scope, "requesting token from Azure CLI");
        let fresh = self.request(scope).await?;
        let token = fresh.token.clone();
        self.cache.lock().insert(scope.clone(), fresh);
        Ok(token)
    }
}

/// `expires_on` is a unix timestamp, as a number or a string depending on
/// the CLI version; without it the token is used once and not cached
fn parse_cli_token(stdout: &[u8]) -> Result<CachedToken, TokenError> {
    let parsed: CliToken =
        serde_json::from_slice(stdout).map_err(|e| TokenError::Malformed(e.to_string()))?;

    let expires_on = match parsed.expires_on {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    Ok(CachedToken {
        token: parsed.access_token,
        expires_on,
    })
}
