use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tokio::sync::{Mutex, Notify};

use stepflow_core::types::{ApiKeyLocation, SecurityScheme, SecuritySchemeKind};

use crate::auth::oauth::{self, TokenEntry};
use crate::auth::{AuthError, CredentialKey, OAuth2Material, SchemeMaterial, SecretValue};
use crate::http::{HttpClient, HttpError};

/// Where the request builder must place a resolved credential.
#[derive(Debug, Clone)]
pub enum Credential {
    Header { name: String, value: SecretValue },
    Query { name: String, value: SecretValue },
    Cookie { name: String, value: SecretValue },
}

#[derive(Debug, Clone)]
pub struct CredentialProviderConfig {
    /// Margin subtracted from token lifetimes; a token within this margin
    /// of expiry is refreshed before use.
    pub clock_skew: Duration,
    /// Timeout applied to token endpoint requests.
    pub token_timeout: Duration,
}

impl Default for CredentialProviderConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(30),
            token_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct ProviderState {
    tokens: HashMap<CredentialKey, TokenEntry>,
    inflight: HashMap<CredentialKey, Arc<Notify>>,
}

/// Resolves security schemes to concrete credentials.
///
/// Static schemes (apiKey, basic, bearer) are a direct lookup of the
/// configured material. OAuth2 schemes go through a token cache with
/// single-flight acquisition: concurrent steps needing the same token
/// produce exactly one token endpoint request, the rest wait on a
/// [`Notify`] and re-read the cache.
pub struct CredentialProvider {
    http: Arc<dyn HttpClient>,
    materials: HashMap<CredentialKey, SchemeMaterial>,
    config: CredentialProviderConfig,
    state: Arc<Mutex<ProviderState>>,
}

impl CredentialProvider {
    pub fn new(http: Arc<dyn HttpClient>, config: CredentialProviderConfig) -> Self {
        Self {
            http,
            materials: HashMap::new(),
            config,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn with_material(
        mut self,
        source: impl Into<String>,
        scheme: impl Into<String>,
        material: SchemeMaterial,
    ) -> Self {
        self.materials
            .insert(CredentialKey::new(source, scheme), material);
        self
    }

    /// Resolve a scheme to a placeable credential using the configured skew.
    pub async fn credential(
        &self,
        source: &str,
        scheme: &SecurityScheme,
    ) -> Result<Credential, AuthError> {
        self.credential_with_skew(source, scheme, self.config.clock_skew)
            .await
    }

    /// Resolve with an explicit freshness margin, overriding the default.
    pub async fn credential_with_skew(
        &self,
        source: &str,
        scheme: &SecurityScheme,
        skew: Duration,
    ) -> Result<Credential, AuthError> {
        let key = CredentialKey::new(source, scheme.name.clone());
        let material = self
            .materials
            .get(&key)
            .ok_or_else(|| AuthError::MissingMaterial {
                source_name: source.to_string(),
                scheme: scheme.name.clone(),
            })?;

        match (&scheme.kind, material) {
            (
                SecuritySchemeKind::ApiKey {
                    param_name,
                    location,
                },
                SchemeMaterial::ApiKey { value },
            ) => Ok(match location {
                ApiKeyLocation::Header => Credential::Header {
                    name: param_name.clone(),
                    value: value.clone(),
                },
                ApiKeyLocation::Query => Credential::Query {
                    name: param_name.clone(),
                    value: value.clone(),
                },
                ApiKeyLocation::Cookie => Credential::Cookie {
                    name: param_name.clone(),
                    value: value.clone(),
                },
            }),
            (SecuritySchemeKind::HttpBasic, SchemeMaterial::Basic { username, password }) => {
                let pair = format!("{}:{}", username, password.expose());
                let encoded = base64::engine::general_purpose::STANDARD.encode(pair);
                Ok(Credential::Header {
                    name: "Authorization".to_string(),
                    value: SecretValue::new(format!("Basic {encoded}")),
                })
            }
            (SecuritySchemeKind::HttpBearer, SchemeMaterial::Bearer { token }) => {
                Ok(Credential::Header {
                    name: "Authorization".to_string(),
                    value: SecretValue::new(format!("Bearer {}", token.expose())),
                })
            }
            (
                SecuritySchemeKind::OAuth2 {
                    token_url,
                    grant,
                    scopes,
                },
                SchemeMaterial::OAuth2(oauth_material),
            ) => {
                let entry = self
                    .oauth_token(&key, token_url, *grant, scopes, oauth_material, skew)
                    .await?;
                Ok(Credential::Header {
                    name: "Authorization".to_string(),
                    value: SecretValue::new(format!("Bearer {}", entry.access.expose())),
                })
            }
            _ => Err(AuthError::MaterialMismatch {
                scheme: scheme.name.clone(),
            }),
        }
    }

    /// Drop a cached token so the next request reacquires it.
    pub async fn invalidate(&self, source: &str, scheme: &str) {
        let key = CredentialKey::new(source, scheme);
        self.state.lock().await.tokens.remove(&key);
    }

    async fn oauth_token(
        &self,
        key: &CredentialKey,
        token_url: &str,
        grant: stepflow_core::types::OAuth2Grant,
        scopes: &[String],
        material: &OAuth2Material,
        skew: Duration,
    ) -> Result<TokenEntry, AuthError> {
        loop {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.tokens.get(key) {
                if entry.is_fresh(skew) {
                    return Ok(entry.clone());
                }
            }
            let notify = match state.inflight.get(key) {
                Some(n) => n.clone(),
                None => {
                    let n = Arc::new(Notify::new());
                    state.inflight.insert(key.clone(), n);
                    break;
                }
            };
            // Someone else owns the flight; wait for its completion and
            // re-check the cache. A failed flight leaves the cache empty,
            // in which case this task takes over. The wait must be
            // registered before the lock is released or the owner can
            // notify in the gap and the wakeup is lost.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            notified.await;
        }

        // The flight runs detached: a cancelled caller must not strand
        // the inflight entry, or every later waiter parks forever.
        let flight = tokio::spawn(Self::run_flight(
            self.http.clone(),
            self.state.clone(),
            key.clone(),
            token_url.to_string(),
            grant,
            scopes.to_vec(),
            material.clone(),
            skew,
            self.config.token_timeout,
        ));

        match flight.await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Transport(HttpError::Other(
                "token acquisition task failed".to_string(),
            ))),
        }
    }

    /// Owns one token flight end to end: acquire, publish, wake waiters.
    #[allow(clippy::too_many_arguments)]
    async fn run_flight(
        http: Arc<dyn HttpClient>,
        state: Arc<Mutex<ProviderState>>,
        key: CredentialKey,
        token_url: String,
        grant: stepflow_core::types::OAuth2Grant,
        scopes: Vec<String>,
        material: OAuth2Material,
        skew: Duration,
        timeout: Duration,
    ) -> Result<TokenEntry, AuthError> {
        let result = Self::acquire(
            &http, &state, &key, &token_url, grant, &scopes, &material, skew, timeout,
        )
        .await;

        let mut st = state.lock().await;
        if let Ok(entry) = &result {
            st.tokens.insert(key.clone(), entry.clone());
        }
        if let Some(n) = st.inflight.remove(&key) {
            n.notify_waiters();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn acquire(
        http: &Arc<dyn HttpClient>,
        state: &Arc<Mutex<ProviderState>>,
        key: &CredentialKey,
        token_url: &str,
        grant: stepflow_core::types::OAuth2Grant,
        scopes: &[String],
        material: &OAuth2Material,
        skew: Duration,
        timeout: Duration,
    ) -> Result<TokenEntry, AuthError> {
        // Prefer refreshing an existing token. A stale entry may still
        // carry a usable refresh token even though its access token is
        // past the margin.
        let refresh = {
            let st = state.lock().await;
            st.tokens
                .get(key)
                .and_then(|entry| entry.refresh.clone())
                .or_else(|| material.refresh_token.clone())
        };

        if let Some(rt) = refresh {
            match oauth::refresh_grant(http, token_url, material, &rt, timeout).await {
                Ok(entry) if entry.is_fresh(skew) => return Ok(entry),
                Ok(_) | Err(_) => {}
            }
        }

        // Refresh failed or was not possible; fall back to the declared
        // acquisition grant exactly once.
        oauth::acquisition_grant(http, token_url, grant, scopes, material, &key.scheme, timeout)
            .await
    }
}
