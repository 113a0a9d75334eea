use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use octoidp_server::{AppConfig, ServerBuilder};
use reqwest::{StatusCode, redirect::Policy};
use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

const CLIENT_ID: &str = "72de74a9";
const CLIENT_SECRET: &str = "ZXhhbXBsZS1hcHAtc2VjcmV0";
const REDIRECT_URI: &str = "http://127.0.0.1:5555/callback";

struct Running {
    base: String,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn start_server() -> Running {
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let cfg: AppConfig = toml::from_str(&format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[auth]
issuer = "{base}"

[auth.keys]
algorithm = "ES384"

[auth.refresh_tokens]
secrets = ["{secret}"]

[[connectors]]
type = "local"
id = "local"

[[clients]]
id = "{CLIENT_ID}"
secret = "{CLIENT_SECRET}"
redirect_uris = ["{REDIRECT_URI}"]
name = "Example App"

[[users]]
name = "Kilgore Trout"
email = "kilgore@kilgore.trout"
password = "woof"
"#,
        port = addr.port(),
        secret = "ab".repeat(32),
    ))
    .expect("config");

    let server = ServerBuilder::new()
        .with_config(cfg)
        .build()
        .await
        .expect("build server");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .run_with_listener(listener, async move {
                let _ = rx.await;
            })
            .await
            .expect("serve");
    });

    Running {
        base,
        shutdown: tx,
        handle,
    }
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> Url {
    assert_eq!(resp.status(), StatusCode::FOUND);
    let raw = resp.headers()["location"].to_str().unwrap();
    Url::parse(raw).unwrap()
}

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

fn claims(id_token: &str) -> Value {
    let payload = id_token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

#[tokio::test]
async fn login_code_exchange_and_refresh() {
    let server = start_server().await;
    let http = client();

    let resp = http
        .get(format!("{}/auth", server.base))
        .query(&[
            ("response_type", "code"),
            ("client_id", CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "openid profile email offline_access"),
            ("state", "abc"),
        ])
        .send()
        .await
        .unwrap();
    let login = location(&resp);
    assert!(login.as_str().starts_with(&format!("{}/auth/local/login", server.base)));

    let page = http.get(login.clone()).send().await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert!(page.text().await.unwrap().contains("Example App"));

    let resp = http
        .post(login)
        .form(&[("username", "kilgore@kilgore.trout"), ("password", "woof")])
        .send()
        .await
        .unwrap();
    let callback = location(&resp);
    assert!(callback.as_str().starts_with(REDIRECT_URI));
    let params = query(&callback);
    assert_eq!(params["state"], "abc");

    let resp = http
        .post(format!("{}/token", server.base))
        .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", params["code"].as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens: Value = resp.json().await.unwrap();
    let first = claims(tokens["id_token"].as_str().unwrap());
    assert_eq!(first["iss"], server.base.as_str());
    assert_eq!(first["aud"], CLIENT_ID);
    assert_eq!(first["email"], "kilgore@kilgore.trout");
    assert_eq!(first["name"], "Kilgore Trout");

    let resp = http
        .post(format!("{}/token", server.base))
        .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let refreshed: Value = resp.json().await.unwrap();
    let second = claims(refreshed["id_token"].as_str().unwrap());
    assert_eq!(second["sub"], first["sub"]);
    assert_eq!(second["aud"], first["aud"]);

    // The code is spent.
    let resp = http
        .post(format!("{}/token", server.base))
        .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", params["code"].as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");

    server.stop().await;
}

#[tokio::test]
async fn client_credentials_grant() {
    let server = start_server().await;

    let resp = client()
        .post(format!("{}/token", server.base))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens: Value = resp.json().await.unwrap();
    assert!(tokens.get("refresh_token").is_none());

    let id = claims(tokens["id_token"].as_str().unwrap());
    assert_eq!(id["sub"], CLIENT_ID);
    assert_eq!(id["aud"], CLIENT_ID);

    server.stop().await;
}

#[tokio::test]
async fn discovery_and_health() {
    let server = start_server().await;
    let http = client();

    let doc: Value = http
        .get(format!("{}/.well-known/openid-configuration", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["issuer"], server.base.as_str());

    let jwks_uri = doc["jwks_uri"].as_str().unwrap();
    let keys: Value = http.get(jwks_uri).send().await.unwrap().json().await.unwrap();
    assert_eq!(keys["keys"][0]["kty"], "EC");

    let health: Value = http
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    server.stop().await;
}
