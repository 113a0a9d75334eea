//! Remote OpenID Connect connector.
//!
//! The browser is sent to the upstream provider with `state` set to the
//! session ID and `nonce` set to `hex(sha256(session ID))`. The upstream
//! redirects back to `{issuer}/auth/{id}/callback`, where the code is
//! exchanged and the returned ID token is verified against the upstream
//! JWKS before any identity is reported.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use url::Url;

use super::{Connector, ConnectorError, ConnectorKind, Credentials, default_timeout, endpoint_url};
use crate::error::{AuthError, AuthResult};
use crate::types::RemoteIdentity;

/// Remote OIDC connector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OidcConfig {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Upstream issuer; discovery is read from
    /// `{issuer}/.well-known/openid-configuration`.
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_name() -> String {
    "OpenID Connect".to_string()
}

/// How long a fetched discovery document is reused for logins.
const DISCOVERY_TTL: Duration = Duration::from_secs(3600);

/// Minimum time between two JWKS fetches triggered by unknown `kid`s.
const JWKS_MIN_REFRESH: Duration = Duration::from_secs(60);

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
}

/// The subset of upstream discovery this connector reads.
#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    issuer: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    jwks_uri: Url,
}

#[derive(Debug, Deserialize)]
struct UpstreamTokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

/// A fetched upstream document and when it was fetched.
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Delegates authentication to an upstream OpenID provider.
pub struct OidcConnector {
    config: OidcConfig,
    issuer: Url,
    callback_url: Url,
    http: reqwest::Client,
    discovery: RwLock<Option<Cached<Discovery>>>,
    jwks: RwLock<Option<Cached<JwkSet>>>,
}

impl OidcConnector {
    /// Creates a connector whose callback lives under `issuer`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid upstream issuer or if
    /// the HTTP client cannot be built.
    pub fn new(config: OidcConfig, issuer: &Url) -> AuthResult<Self> {
        let upstream = Url::parse(&config.issuer).map_err(|e| {
            AuthError::configuration(format!(
                "oidc connector '{}' has an invalid issuer: {e}",
                config.id
            ))
        })?;
        let callback_url = endpoint_url(issuer, &config.id, "callback")?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            config,
            issuer: upstream,
            callback_url,
            http,
            discovery: RwLock::new(None),
            jwks: RwLock::new(None),
        })
    }

    /// The nonce sent upstream for `session_id`.
    #[must_use]
    pub fn nonce_for(session_id: &str) -> String {
        hex::encode(Sha256::digest(session_id.as_bytes()))
    }

    /// Returns the discovery document, refetching it once the cached copy
    /// is older than [`DISCOVERY_TTL`].
    async fn discovery(&self) -> Result<Discovery, ConnectorError> {
        if let Some(cached) = self.discovery.read().await.as_ref() {
            if cached.is_fresh(DISCOVERY_TTL) {
                return Ok(cached.value.clone());
            }
        }
        self.fetch_discovery().await
    }

    /// Fetches the discovery document from the upstream and caches it.
    async fn fetch_discovery(&self) -> Result<Discovery, ConnectorError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            self.issuer.as_str().trim_end_matches('/')
        );
        let doc: Discovery = self.get_json(&url).await?;
        if doc.issuer.trim_end_matches('/') != self.issuer.as_str().trim_end_matches('/') {
            return Err(ConnectorError::upstream(
                &self.config.id,
                format!("discovery issuer mismatch: {}", doc.issuer),
            ));
        }

        tracing::debug!(connector_id = %self.config.id, "Fetched upstream discovery document");
        *self.discovery.write().await = Some(Cached::new(doc.clone()));
        Ok(doc)
    }

    /// Returns the decoding key and algorithm for `kid`.
    ///
    /// An unknown `kid` refetches the JWKS, at most once per
    /// [`JWKS_MIN_REFRESH`].
    async fn decoding_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Algorithm), ConnectorError> {
        {
            let cached = self.jwks.read().await;
            if let Some(cached) = cached.as_ref() {
                if let Some(jwk) = cached.value.find(kid) {
                    return self.key_from_jwk(jwk);
                }
                if cached.is_fresh(JWKS_MIN_REFRESH) {
                    return Err(self.unknown_kid(kid));
                }
            }
        }

        let set: JwkSet = self.get_json(jwks_uri.as_str()).await?;
        tracing::debug!(
            connector_id = %self.config.id,
            keys = set.keys.len(),
            "Fetched upstream JWKS"
        );
        let key = set
            .find(kid)
            .ok_or_else(|| self.unknown_kid(kid))
            .and_then(|jwk| self.key_from_jwk(jwk));
        *self.jwks.write().await = Some(Cached::new(set));
        key
    }

    fn key_from_jwk(&self, jwk: &Jwk) -> Result<(DecodingKey, Algorithm), ConnectorError> {
        let algorithm = jwk_algorithm(jwk).ok_or_else(|| {
            ConnectorError::upstream(&self.config.id, "upstream key has no usable signing algorithm")
        })?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| ConnectorError::upstream(&self.config.id, e.to_string()))?;
        Ok((key, algorithm))
    }

    fn unknown_kid(&self, kid: &str) -> ConnectorError {
        ConnectorError::upstream(&self.config.id, format!("no upstream key '{kid}'"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ConnectorError> {
        self.http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ConnectorError::from_http(&self.config.id, &e))?
            .json()
            .await
            .map_err(|e| ConnectorError::upstream(&self.config.id, e.to_string()))
    }

    async fn exchange(&self, discovery: &Discovery, code: &str) -> Result<String, ConnectorError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.callback_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response: UpstreamTokenResponse = self
            .http
            .post(discovery.token_endpoint.as_str())
            .form(&params)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ConnectorError::from_http(&self.config.id, &e))?
            .json()
            .await
            .map_err(|e| ConnectorError::upstream(&self.config.id, e.to_string()))?;
        Ok(response.id_token)
    }

    async fn verify_id_token(
        &self,
        discovery: &Discovery,
        id_token: &str,
        session_id: &str,
    ) -> Result<UpstreamClaims, ConnectorError> {
        let invalid = |reason: String| ConnectorError::upstream(&self.config.id, reason);

        let header = decode_header(id_token).map_err(|e| invalid(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| invalid("upstream id_token has no kid".to_string()))?;
        let (key, algorithm) = self.decoding_key(&discovery.jwks_uri, &kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_issuer(&[&discovery.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<UpstreamClaims>(id_token, &key, &validation)
            .map_err(|e| invalid(format!("upstream id_token rejected: {e}")))?
            .claims;

        if claims.nonce.as_deref() != Some(Self::nonce_for(session_id).as_str()) {
            return Err(invalid("upstream id_token nonce mismatch".to_string()));
        }
        Ok(claims)
    }
}

#[async_trait]
impl Connector for OidcConnector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Oidc
    }

    async fn login_url(&self, session_id: &str) -> Result<Url, ConnectorError> {
        let discovery = self.discovery().await?;
        let mut url = discovery.authorization_endpoint;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.callback_url.as_str())
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", session_id)
            .append_pair("nonce", &Self::nonce_for(session_id));
        Ok(url)
    }

    async fn authenticate(
        &self,
        credentials: Credentials,
    ) -> Result<RemoteIdentity, ConnectorError> {
        let Credentials::AuthorizationCode { code, session_id } = credentials else {
            return Err(ConnectorError::unsupported_credentials(&self.config.id));
        };

        let discovery = self.discovery().await?;
        let id_token = self.exchange(&discovery, &code).await?;
        let claims = self.verify_id_token(&discovery, &id_token, &session_id).await?;

        let name = claims
            .name
            .or(claims.preferred_username)
            .unwrap_or_else(|| claims.sub.clone());
        let mut identity = RemoteIdentity::new(claims.sub, name);
        identity.email = claims.email;

        tracing::debug!(connector_id = %self.config.id, "Upstream identity verified");
        Ok(identity)
    }

    async fn healthy(&self) -> Result<(), ConnectorError> {
        self.fetch_discovery().await.map(|_| ())
    }
}

/// The signing algorithm a JWK is meant for. The `alg` member wins; without
/// it the algorithm follows from the key type. Symmetric keys are refused.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(alg) = &jwk.common.key_algorithm {
        return match alg {
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{SigningAlgorithm, SigningKeyPair};
    use serde_json::json;

    fn upstream_jwk(value: serde_json::Value) -> Jwk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_algorithm_follows_key_not_token() {
        let ec = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        let jwk = upstream_jwk(serde_json::to_value(ec.to_jwk()).unwrap());
        assert_eq!(jwk_algorithm(&jwk), Some(Algorithm::ES384));

        let rsa = SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap();
        let mut value = serde_json::to_value(rsa.to_jwk()).unwrap();
        value.as_object_mut().unwrap().remove("alg");
        assert_eq!(jwk_algorithm(&upstream_jwk(value)), Some(Algorithm::RS256));
    }

    #[test]
    fn test_symmetric_keys_refused() {
        let jwk = upstream_jwk(json!({
            "kty": "oct",
            "kid": "shared",
            "alg": "HS256",
            "k": "c2VjcmV0",
        }));
        assert_eq!(jwk_algorithm(&jwk), None);

        let jwk = upstream_jwk(json!({
            "kty": "oct",
            "kid": "shared",
            "k": "c2VjcmV0",
        }));
        assert_eq!(jwk_algorithm(&jwk), None);
    }
}
