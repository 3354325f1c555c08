mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stepflow_core::types::{OAuth2Grant, SecurityScheme, SecuritySchemeKind};
use stepflow_engine::auth::{
    AuthError, Credential, CredentialProvider, CredentialProviderConfig, OAuth2Material,
    SchemeMaterial,
};

use common::{json_response, ScriptedClient};

fn oauth_scheme() -> SecurityScheme {
    SecurityScheme {
        name: "oauth".to_string(),
        kind: SecuritySchemeKind::OAuth2 {
            token_url: "https://auth.test/token".to_string(),
            grant: OAuth2Grant::ClientCredentials,
            scopes: vec!["read".to_string()],
        },
    }
}

fn provider(client: Arc<ScriptedClient>, material: OAuth2Material) -> CredentialProvider {
    CredentialProvider::new(client, CredentialProviderConfig::default()).with_material(
        "api",
        "oauth",
        SchemeMaterial::OAuth2(material),
    )
}

fn bearer(credential: &Credential) -> String {
    match credential {
        Credential::Header { name, value } => {
            assert_eq!(name, "Authorization");
            value.expose().to_string()
        }
        other => panic!("expected header credential, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_token_request() {
    let client = ScriptedClient::with_delay(Duration::from_millis(100), |n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 3600}),
        ))
    });
    let provider = Arc::new(provider(
        client.clone(),
        OAuth2Material::client("cid", "secret"),
    ));
    let scheme = oauth_scheme();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let p = provider.clone();
        let s = scheme.clone();
        tasks.push(tokio::spawn(async move {
            p.credential("api", &s).await.map(|c| bearer(&c))
        }));
    }

    let mut values = Vec::new();
    for t in tasks {
        values.push(t.await.unwrap().unwrap());
    }

    assert_eq!(client.call_count(), 1);
    assert!(values.iter().all(|v| v == "Bearer tok-0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_always_observe_flight_completion() {
    let client = ScriptedClient::new(|n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 1}),
        ))
    });
    let provider = Arc::new(provider(
        client.clone(),
        OAuth2Material::client("cid", "secret"),
    ));
    let scheme = oauth_scheme();

    // One-second tokens under a two-second margin are stale on arrival,
    // so every resolution either owns or joins a flight. A waiter whose
    // registration landed after the owner's wakeup would hang here.
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let p = provider.clone();
        let s = scheme.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..16 {
                p.credential_with_skew("api", &s, Duration::from_secs(2))
                    .await
                    .unwrap();
            }
        }));
    }
    for t in tasks {
        tokio::time::timeout(Duration::from_secs(10), t)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn abandoned_acquisition_does_not_strand_later_callers() {
    let client = ScriptedClient::with_delay(Duration::from_millis(200), |n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 3600}),
        ))
    });
    let provider = Arc::new(provider(
        client.clone(),
        OAuth2Material::client("cid", "secret"),
    ));
    let scheme = oauth_scheme();

    // Kill the first caller while its token request is in flight. The
    // flight must still complete and wake anyone waiting on it.
    let first = tokio::spawn({
        let p = provider.clone();
        let s = scheme.clone();
        async move { p.credential("api", &s).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.abort();
    let _ = first.await;

    let credential =
        tokio::time::timeout(Duration::from_secs(5), provider.credential("api", &scheme))
            .await
            .unwrap()
            .unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(bearer(&credential), "Bearer tok-0");
}

#[tokio::test]
async fn missing_material_names_source_and_scheme() {
    let client = ScriptedClient::new(|_, _| Ok(json_response(200, json!({}))));
    let provider = CredentialProvider::new(client, CredentialProviderConfig::default());

    let err = provider
        .credential("api", &oauth_scheme())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::MissingMaterial { ref source_name, ref scheme }
            if source_name == "api" && scheme == "oauth"
    ));
    assert_eq!(
        err.to_string(),
        "no credential material configured for scheme 'oauth' of source 'api'"
    );
}

#[tokio::test]
async fn token_inside_skew_margin_is_reacquired() {
    let client = ScriptedClient::new(|n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 1}),
        ))
    });
    let provider = provider(client.clone(), OAuth2Material::client("cid", "secret"));
    let scheme = oauth_scheme();

    // A one-second token under a two-second margin is already stale the
    // moment it is issued, so each resolution hits the endpoint.
    let skew = Duration::from_secs(2);
    let first = provider
        .credential_with_skew("api", &scheme, skew)
        .await
        .unwrap();
    let second = provider
        .credential_with_skew("api", &scheme, skew)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(bearer(&first), "Bearer tok-0");
    assert_eq!(bearer(&second), "Bearer tok-1");
}

#[tokio::test]
async fn fresh_token_is_served_from_cache() {
    let client = ScriptedClient::new(|n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 3600}),
        ))
    });
    let provider = provider(client.clone(), OAuth2Material::client("cid", "secret"));
    let scheme = oauth_scheme();

    let first = provider.credential("api", &scheme).await.unwrap();
    let second = provider.credential("api", &scheme).await.unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(bearer(&first), bearer(&second));
}

#[tokio::test]
async fn invalidated_token_is_reacquired() {
    let client = ScriptedClient::new(|n, _| {
        Ok(json_response(
            200,
            json!({"access_token": format!("tok-{n}"), "expires_in": 3600}),
        ))
    });
    let provider = provider(client.clone(), OAuth2Material::client("cid", "secret"));
    let scheme = oauth_scheme();

    provider.credential("api", &scheme).await.unwrap();
    provider.invalidate("api", "oauth").await;
    let after = provider.credential("api", &scheme).await.unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(bearer(&after), "Bearer tok-1");
}

#[tokio::test]
async fn failed_refresh_falls_back_to_the_primary_grant() {
    let client = ScriptedClient::new(|n, req| {
        let body = String::from_utf8_lossy(&req.body).to_string();
        if body.contains("grant_type=refresh_token") {
            Ok(json_response(400, json!({"error": "invalid_grant"})))
        } else {
            Ok(json_response(
                200,
                json!({"access_token": format!("tok-{n}"), "expires_in": 3600}),
            ))
        }
    });
    let mut material = OAuth2Material::client("cid", "secret");
    material.refresh_token = Some("stale-refresh".into());
    let provider = provider(client.clone(), material);

    let credential = provider.credential("api", &oauth_scheme()).await.unwrap();

    // First the refresh attempt, then the client-credentials grant.
    assert_eq!(client.call_count(), 2);
    let refresh_body = String::from_utf8_lossy(&client.request(0).body).to_string();
    assert!(refresh_body.contains("grant_type=refresh_token"));
    let primary_body = String::from_utf8_lossy(&client.request(1).body).to_string();
    assert!(primary_body.contains("grant_type=client_credentials"));
    assert!(primary_body.contains("scope=read"));
    assert_eq!(bearer(&credential), "Bearer tok-1");
}

#[tokio::test]
async fn exhausted_grants_surface_an_auth_error() {
    let client = ScriptedClient::new(|_, _| Ok(json_response(500, json!({}))));
    let mut material = OAuth2Material::client("cid", "secret");
    material.refresh_token = Some("stale-refresh".into());
    let provider = provider(client.clone(), material);

    let err = provider
        .credential("api", &oauth_scheme())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::TokenEndpointStatus { status: 500 }
    ));
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn mismatched_material_is_rejected() {
    let client = ScriptedClient::new(|_, _| Ok(json_response(200, json!({}))));
    let provider = CredentialProvider::new(client, CredentialProviderConfig::default())
        .with_material(
            "api",
            "oauth",
            SchemeMaterial::Bearer {
                token: "t".into(),
            },
        );

    let err = provider
        .credential("api", &oauth_scheme())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::MaterialMismatch { ref scheme } if scheme == "oauth"));
}
