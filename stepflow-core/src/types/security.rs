/// A security scheme declared by a source description. Only the shape is
/// modeled here; secret material is supplied to the credential provider
/// at construction time and never appears in the document.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SecurityScheme {
    pub name: String,

    #[serde(flatten)]
    pub kind: SecuritySchemeKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecuritySchemeKind {
    #[serde(rename_all = "camelCase")]
    ApiKey {
        /// Name of the header, query parameter, or cookie carrying the key.
        param_name: String,
        location: ApiKeyLocation,
    },
    HttpBasic,
    HttpBearer,
    #[serde(rename_all = "camelCase")]
    OAuth2 {
        token_url: String,
        grant: OAuth2Grant,
        #[serde(default)]
        scopes: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// Grant used for the initial token acquisition. Refreshing always uses
/// the refresh-token grant when a refresh token is available, whatever
/// the acquisition grant was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2Grant {
    ClientCredentials,
    Password,
    /// Authorization code previously obtained out of band.
    AuthorizationCode,
    /// A long-lived refresh token supplied as configuration.
    RefreshToken,
}
