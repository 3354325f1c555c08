//! Token endpoint exchanges for the OAuth2 grants the engine supports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stepflow_core::types::OAuth2Grant;

use crate::auth::{AuthError, OAuth2Material, SecretValue};
use crate::http::{HttpClient, HttpRequest};

/// A cached OAuth2 token with its refresh material.
#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub access: SecretValue,
    pub refresh: Option<SecretValue>,
    /// Absolute expiry; `None` when the endpoint sent no `expires_in`.
    pub expires_at: Option<Instant>,
    pub scopes: Vec<String>,
}

impl TokenEntry {
    /// A token is usable when it outlives `now + skew`; the margin moves
    /// the effective expiry earlier so refresh happens proactively.
    pub fn is_fresh(&self, skew: Duration) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + skew < at,
            None => true,
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Execute the refresh-token grant.
pub(crate) async fn refresh_grant(
    http: &Arc<dyn HttpClient>,
    token_url: &str,
    material: &OAuth2Material,
    refresh_token: &SecretValue,
    timeout: Duration,
) -> Result<TokenEntry, AuthError> {
    let form = vec![
        ("grant_type".to_string(), "refresh_token".to_string()),
        ("refresh_token".to_string(), refresh_token.expose().to_string()),
        ("client_id".to_string(), material.client_id.clone()),
        ("client_secret".to_string(), material.client_secret.expose().to_string()),
    ];
    token_request(http, token_url, form, timeout).await
}

/// Execute the declared acquisition grant.
pub(crate) async fn acquisition_grant(
    http: &Arc<dyn HttpClient>,
    token_url: &str,
    grant: OAuth2Grant,
    scopes: &[String],
    material: &OAuth2Material,
    scheme_name: &str,
    timeout: Duration,
) -> Result<TokenEntry, AuthError> {
    let mut form = vec![
        ("client_id".to_string(), material.client_id.clone()),
        ("client_secret".to_string(), material.client_secret.expose().to_string()),
    ];

    match grant {
        OAuth2Grant::ClientCredentials => {
            form.push(("grant_type".into(), "client_credentials".into()));
        }
        OAuth2Grant::Password => {
            let (user, pass) = match (&material.username, &material.password) {
                (Some(u), Some(p)) => (u.clone(), p.expose().to_string()),
                _ => {
                    return Err(AuthError::MissingGrantMaterial {
                        scheme: scheme_name.to_string(),
                        detail: "password grant needs username and password".to_string(),
                    })
                }
            };
            form.push(("grant_type".into(), "password".into()));
            form.push(("username".into(), user));
            form.push(("password".into(), pass));
        }
        OAuth2Grant::AuthorizationCode => {
            let code = material.authorization_code.as_ref().ok_or_else(|| {
                AuthError::MissingGrantMaterial {
                    scheme: scheme_name.to_string(),
                    detail: "authorization-code grant needs a stored code".to_string(),
                }
            })?;
            form.push(("grant_type".into(), "authorization_code".into()));
            form.push(("code".into(), code.expose().to_string()));
            if let Some(uri) = &material.redirect_uri {
                form.push(("redirect_uri".into(), uri.clone()));
            }
        }
        OAuth2Grant::RefreshToken => {
            let rt = material.refresh_token.as_ref().ok_or_else(|| {
                AuthError::MissingGrantMaterial {
                    scheme: scheme_name.to_string(),
                    detail: "refresh-token grant needs a stored refresh token".to_string(),
                }
            })?;
            form.push(("grant_type".into(), "refresh_token".into()));
            form.push(("refresh_token".into(), rt.expose().to_string()));
        }
    }

    if !scopes.is_empty() {
        form.push(("scope".into(), scopes.join(" ")));
    }

    token_request(http, token_url, form, timeout).await
}

async fn token_request(
    http: &Arc<dyn HttpClient>,
    token_url: &str,
    form: Vec<(String, String)>,
    timeout: Duration,
) -> Result<TokenEntry, AuthError> {
    let url = url::Url::parse(token_url)
        .map_err(|_| AuthError::InvalidTokenUrl(token_url.to_string()))?;

    let body: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();

    let mut headers = BTreeMap::new();
    headers.insert(
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    );
    headers.insert("Accept".to_string(), "application/json".to_string());

    let issued_at = Instant::now();
    let resp = http
        .send(
            HttpRequest {
                method: "POST".to_string(),
                url,
                headers,
                body: body.into_bytes(),
            },
            timeout,
        )
        .await?;

    if !(200..300).contains(&resp.status) {
        return Err(AuthError::TokenEndpointStatus {
            status: resp.status,
        });
    }

    let parsed: TokenResponse = serde_json::from_slice(&resp.body)
        .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))?;

    Ok(TokenEntry {
        access: SecretValue::new(parsed.access_token),
        refresh: parsed.refresh_token.map(SecretValue::new),
        expires_at: parsed
            .expires_in
            .map(|secs| issued_at + Duration::from_secs_f64(secs.max(0.0))),
        scopes: parsed
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}
