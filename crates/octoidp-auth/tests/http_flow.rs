//! End-to-end flows through the router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use octoidp_auth::client::ClientRegistry;
use octoidp_auth::config::{IdpConfig, KeyConfig, RefreshTokenConfig};
use octoidp_auth::connector::{ConnectorConfig, ConnectorRegistry, LocalConfig};
use octoidp_auth::http::{IdpState, router};
use octoidp_auth::keys::{KeyManager, KeyRotator, SigningAlgorithm};
use octoidp_auth::oauth::AuthorizationServer;
use octoidp_auth::password::hash_password;
use octoidp_auth::storage::{PasswordStorage, UserStorage};
use octoidp_auth::token::{Audience, IdTokenIssuer};
use octoidp_auth::types::{ClientIdentity, ClientSecret, PasswordInfo, User};
use octoidp_db_memory::MemoryUserStorage;

const ISSUER: &str = "http://127.0.0.1:5556";
const CLIENT_ID: &str = "72de74a9";
const CLIENT_SECRET: &str = "ZXhhbXBsZS1hcHAtc2VjcmV0";
const REDIRECT_URI: &str = "http://127.0.0.1:5555/callback";

struct Harness {
    app: Router,
    tokens: IdTokenIssuer,
    user: User,
    users: Arc<MemoryUserStorage>,
}

async fn harness() -> Harness {
    let stores = octoidp_db_memory::create_stores();
    let config = IdpConfig {
        issuer: ISSUER.to_string(),
        keys: KeyConfig {
            algorithm: SigningAlgorithm::ES384,
            ..KeyConfig::default()
        },
        refresh_tokens: RefreshTokenConfig {
            secrets: vec!["11".repeat(32)],
        },
        ..IdpConfig::default()
    };

    let mut user = User::new("Kilgore Trout");
    user.email = Some("kilgore@kilgore.trout".to_string());
    user.email_verified = true;
    stores.users.create(&user).await.unwrap();
    stores
        .users
        .set_password(&PasswordInfo {
            user_id: user.id.clone(),
            password_hash: hash_password("woof").unwrap(),
        })
        .await
        .unwrap();

    let clients = ClientRegistry::new(stores.client_storage());
    clients
        .register(
            ClientIdentity {
                id: CLIENT_ID.to_string(),
                secret: Some(ClientSecret::Plaintext(CLIENT_SECRET.to_string())),
                redirect_uris: vec![Url::parse(REDIRECT_URI).unwrap()],
                public: false,
                name: Some("Example App".to_string()),
            },
            Vec::new(),
        )
        .await
        .unwrap();
    clients
        .register(
            ClientIdentity {
                id: "peer-api".to_string(),
                secret: Some(ClientSecret::hashed("peer-secret")),
                redirect_uris: Vec::new(),
                public: false,
                name: None,
            },
            vec![CLIENT_ID.to_string()],
        )
        .await
        .unwrap();

    let issuer = config.issuer_url().unwrap();
    let connectors = ConnectorRegistry::new();
    connectors
        .register(
            ConnectorConfig::Local(LocalConfig {
                id: "local".to_string(),
                name: "Email".to_string(),
            })
            .build(&issuer, stores.user_storage(), stores.password_storage())
            .unwrap(),
        )
        .unwrap();

    let keys = Arc::new(KeyManager::new(config.tokens.id_token_ttl));
    KeyRotator::new(Arc::clone(&keys), config.keys.clone())
        .rotate_now()
        .await
        .unwrap();

    let server = AuthorizationServer::new(
        &config,
        Arc::clone(&keys),
        Arc::new(clients),
        Arc::new(connectors),
        stores.auth(),
    )
    .unwrap();

    Harness {
        app: router(IdpState::new(Arc::new(server))),
        tokens: IdTokenIssuer::new(keys, ISSUER, Duration::from_secs(3600)),
        user,
        users: Arc::clone(&stores.users),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_form(app: &Router, uri: &str, form: &[(&str, &str)], basic: Option<(&str, &str)>) -> Response<Body> {
    let mut request = Request::post(uri).header(
        header::CONTENT_TYPE,
        "application/x-www-form-urlencoded",
    );
    if let Some((id, secret)) = basic {
        request = request.header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode(format!("{id}:{secret}"))),
        );
    }
    let body = serde_urlencoded::to_string(form).unwrap();
    send(app, request.body(Body::from(body)).unwrap()).await
}

async fn json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> Url {
    assert_eq!(response.status(), StatusCode::FOUND);
    let raw = response.headers()[header::LOCATION].to_str().unwrap();
    Url::parse(raw).unwrap()
}

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

/// Runs `/auth` and the local login form, returning the client redirect.
async fn login(app: &Router, scope: &str, password: &str) -> Response<Body> {
    let auth_url = format!(
        "/auth?{}",
        serde_urlencoded::to_string([
            ("response_type", "code"),
            ("client_id", CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("scope", scope),
            ("state", "af0ifjsldkj"),
            ("nonce", "n-0S6_WzA2Mj"),
        ])
        .unwrap()
    );
    let login_url = location(&get(app, &auth_url).await);
    assert_eq!(login_url.path(), "/auth/local/login");
    let session_id = query(&login_url)["session_id"].clone();

    let form_page = get(app, &format!("/auth/local/login?session_id={session_id}")).await;
    assert_eq!(form_page.status(), StatusCode::OK);

    post_form(
        app,
        &format!("/auth/local/login?session_id={session_id}"),
        &[("username", "kilgore@kilgore.trout"), ("password", password)],
        None,
    )
    .await
}

async fn code_for(app: &Router, scope: &str) -> String {
    let redirect = location(&login(app, scope, "woof").await);
    assert!(redirect.as_str().starts_with(REDIRECT_URI));
    let params = query(&redirect);
    assert_eq!(params["state"], "af0ifjsldkj");
    params["code"].clone()
}

#[tokio::test]
async fn test_code_flow_then_refresh() {
    let h = harness().await;
    let code = code_for(&h.app, "openid profile email offline_access").await;

    let response = post_form(
        &h.app,
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = json(response).await;
    assert_eq!(body["token_type"], "bearer");

    let claims = h
        .tokens
        .verify(body["id_token"].as_str().unwrap(), CLIENT_ID)
        .unwrap();
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, h.user.id);
    assert_eq!(claims.aud, Audience::One(CLIENT_ID.to_string()));
    assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    assert_eq!(claims.email.as_deref(), Some("kilgore@kilgore.trout"));
    assert_eq!(claims.email_verified, Some(true));

    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();
    let response = post_form(
        &h.app,
        "/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = json(response).await;
    let refreshed_claims = h
        .tokens
        .verify(refreshed["id_token"].as_str().unwrap(), CLIENT_ID)
        .unwrap();
    assert_eq!(refreshed_claims.sub, claims.sub);
    assert_eq!(refreshed_claims.aud, claims.aud);
    assert_eq!(refreshed_claims.email, claims.email);
}

/// Exchanges a fresh code for tokens and returns the refresh token.
async fn refresh_token_for(h: &Harness) -> String {
    let code = code_for(&h.app, "openid profile email offline_access").await;
    let response = post_form(
        &h.app,
        "/token",
        &[("grant_type", "authorization_code"), ("code", code.as_str())],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json(response).await["refresh_token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn refresh(h: &Harness, refresh_token: &str) -> Response<Body> {
    post_form(
        &h.app,
        "/token",
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await
}

#[tokio::test]
async fn test_refresh_reads_current_user() {
    let h = harness().await;
    let refresh_token = refresh_token_for(&h).await;

    let mut user = h.users.get(&h.user.id).await.unwrap().unwrap();
    user.display_name = "Kilgore T.".to_string();
    h.users.update(&user).await.unwrap();

    let response = refresh(&h, &refresh_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    let claims = h
        .tokens
        .verify(body["id_token"].as_str().unwrap(), CLIENT_ID)
        .unwrap();
    assert_eq!(claims.sub, h.user.id);
    assert_eq!(claims.name, "Kilgore T.");
}

#[tokio::test]
async fn test_refresh_denied_for_disabled_user() {
    let h = harness().await;
    let refresh_token = refresh_token_for(&h).await;

    let mut user = h.users.get(&h.user.id).await.unwrap().unwrap();
    user.disabled = true;
    h.users.update(&user).await.unwrap();

    let response = refresh(&h, &refresh_token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "access_denied");
}

#[tokio::test]
async fn test_code_is_single_use() {
    let h = harness().await;
    let code = code_for(&h.app, "openid").await;
    let form = [("grant_type", "authorization_code"), ("code", code.as_str())];

    let first = post_form(&h.app, "/token", &form, Some((CLIENT_ID, CLIENT_SECRET))).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(json(first).await.get("refresh_token").is_none());

    let second = post_form(&h.app, "/token", &form, Some((CLIENT_ID, CLIENT_SECRET))).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(second).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_client_credentials() {
    let h = harness().await;
    let response = post_form(
        &h.app,
        "/token",
        &[("grant_type", "client_credentials"), ("scope", "openid offline_access")],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert!(body.get("refresh_token").is_none());

    let claims = h
        .tokens
        .verify(body["id_token"].as_str().unwrap(), CLIENT_ID)
        .unwrap();
    assert_eq!(claims.sub, CLIENT_ID);
    assert_eq!(claims.aud, Audience::One(CLIENT_ID.to_string()));
}

#[tokio::test]
async fn test_trusted_peer_joins_audience() {
    let h = harness().await;
    let code = code_for(&h.app, "openid audience:server:client_id:peer-api").await;
    let response = post_form(
        &h.app,
        "/token",
        &[("grant_type", "authorization_code"), ("code", code.as_str())],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    let body = json(response).await;

    let claims = h
        .tokens
        .verify(body["id_token"].as_str().unwrap(), "peer-api")
        .unwrap();
    assert!(claims.aud.contains(CLIENT_ID));
    assert!(claims.aud.contains("peer-api"));
    assert_eq!(claims.azp.as_deref(), Some(CLIENT_ID));
}

#[tokio::test]
async fn test_wrong_password_rerenders_form() {
    let h = harness().await;
    let response = login(&h.app, "openid", "meow").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_client_secret() {
    let h = harness().await;
    let response = post_form(
        &h.app,
        "/token",
        &[("grant_type", "client_credentials")],
        Some((CLIENT_ID, "nope")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let h = harness().await;
    let response = post_form(
        &h.app,
        "/token",
        &[("grant_type", "password")],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_authorize_errors() {
    let h = harness().await;

    let unknown = get(&h.app, "/auth?response_type=code&client_id=ghost&scope=openid").await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(unknown).await["error"], "invalid_client");

    let no_openid = get(
        &h.app,
        &format!("/auth?response_type=code&client_id={CLIENT_ID}&scope=email&state=s1"),
    )
    .await;
    let redirect = location(&no_openid);
    assert!(redirect.as_str().starts_with(REDIRECT_URI));
    let params = query(&redirect);
    assert_eq!(params["error"], "invalid_scope");
    assert_eq!(params["state"], "s1");
}

#[tokio::test]
async fn test_revoke_refresh_token() {
    let h = harness().await;
    let code = code_for(&h.app, "openid offline_access").await;
    let body = json(
        post_form(
            &h.app,
            "/token",
            &[("grant_type", "authorization_code"), ("code", code.as_str())],
            Some((CLIENT_ID, CLIENT_SECRET)),
        )
        .await,
    )
    .await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let revoked = post_form(
        &h.app,
        "/token/revoke",
        &[("token", refresh_token.as_str())],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(revoked.status(), StatusCode::OK);

    let again = post_form(
        &h.app,
        "/token/revoke",
        &[("token", refresh_token.as_str())],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(again.status(), StatusCode::OK);

    let refresh = post_form(
        &h.app,
        "/token",
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())],
        Some((CLIENT_ID, CLIENT_SECRET)),
    )
    .await;
    assert_eq!(json(refresh).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_discovery_keys_and_health() {
    let h = harness().await;

    let discovery = json(get(&h.app, "/.well-known/openid-configuration").await).await;
    assert_eq!(discovery["issuer"], ISSUER);
    assert_eq!(discovery["token_endpoint"], format!("{ISSUER}/token"));
    assert_eq!(discovery["jwks_uri"], format!("{ISSUER}/keys"));
    assert_eq!(discovery["id_token_signing_alg_values_supported"][0], "ES384");

    let keys = get(&h.app, "/keys").await;
    assert_eq!(keys.status(), StatusCode::OK);
    assert!(
        keys.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .starts_with("public, max-age=")
    );
    let keys = json(keys).await;
    assert_eq!(keys["keys"].as_array().unwrap().len(), 1);
    assert_eq!(keys["keys"][0]["alg"], "ES384");

    let health = json(get(&h.app, "/health").await).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connectors"]["local"]["healthy"], true);
}
