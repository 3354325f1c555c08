//! Credential resolution and injection.
//!
//! Secret material is supplied at construction time, keyed by source
//! description and scheme name; the workflow document only ever names
//! scheme types. OAuth2 tokens are cached per (source, scheme) for the
//! lifetime of the provider and may be reused across runs.

mod material;
mod oauth;
mod provider;
mod secret;

pub use material::{CredentialKey, OAuth2Material, SchemeMaterial};
pub use oauth::TokenEntry;
pub use provider::{Credential, CredentialProvider, CredentialProviderConfig};
pub use secret::SecretValue;

use crate::http::HttpError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no credential material configured for scheme '{scheme}' of source '{source_name}'")]
    MissingMaterial {
        source_name: String,
        scheme: String,
    },
    #[error("material for scheme '{scheme}' does not match its declared type")]
    MaterialMismatch { scheme: String },
    #[error("scheme '{scheme}' is missing material for its grant: {detail}")]
    MissingGrantMaterial { scheme: String, detail: String },
    #[error("invalid token endpoint url '{0}'")]
    InvalidTokenUrl(String),
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] HttpError),
    #[error("token endpoint returned status {status}")]
    TokenEndpointStatus { status: u16 },
    #[error("malformed token response: {0}")]
    InvalidTokenResponse(String),
}
