use crate::auth::SecretValue;

/// Cache and configuration identity of a credential: the source
/// description plus the scheme name, independent of any workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialKey {
    pub source: String,
    pub scheme: String,
}

impl CredentialKey {
    pub fn new(source: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            scheme: scheme.into(),
        }
    }
}

/// Secret material for one scheme, supplied by the configuration
/// collaborator at provider construction time.
#[derive(Debug, Clone)]
pub enum SchemeMaterial {
    ApiKey {
        value: SecretValue,
    },
    Basic {
        username: String,
        password: SecretValue,
    },
    Bearer {
        token: SecretValue,
    },
    OAuth2(OAuth2Material),
}

#[derive(Debug, Clone)]
pub struct OAuth2Material {
    pub client_id: String,
    pub client_secret: SecretValue,
    /// For the password grant.
    pub username: Option<String>,
    pub password: Option<SecretValue>,
    /// For the authorization-code grant, obtained out of band.
    pub authorization_code: Option<SecretValue>,
    pub redirect_uri: Option<String>,
    /// Long-lived refresh token usable for initial acquisition.
    pub refresh_token: Option<SecretValue>,
}

impl OAuth2Material {
    pub fn client(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretValue::new(client_secret.into()),
            username: None,
            password: None,
            authorization_code: None,
            redirect_uri: None,
            refresh_token: None,
        }
    }
}
