//! Signing key pairs and their JWK representation.
//!
//! `jsonwebtoken` signs and verifies but cannot generate keys, so key
//! material is produced with the `rsa` and `p384` crates and loaded back
//! through PEM.
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA-2048 with SHA-256 (the OpenID Connect default)
//! - **RS384**: RSA-2048 with SHA-384
//! - **ES384**: ECDSA with the P-384 curve (fast to generate, small keys)

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as _;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while generating keys or signing and verifying
/// tokens.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// The token signature does not verify.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token has expired.
    #[error("Token has expired")]
    Expired,

    /// The token claims are invalid (issuer, audience, ...).
    #[error("Invalid token claims: {message}")]
    InvalidClaims {
        /// Description of the invalid claims.
        message: String,
    },

    /// No verification key matches the token's `kid`.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key ID that was not found.
        kid: String,
    },

    /// Key generation failed.
    #[error("Key generation failed: {message}")]
    Generation {
        /// Description of the failure.
        message: String,
    },

    /// The key material is unusable.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },
}

impl KeyError {
    fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the error is about a presented token rather than
    /// about our own key material.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Decoding { .. }
                | Self::InvalidSignature
                | Self::Expired
                | Self::InvalidClaims { .. }
                | Self::KeyNotFound { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for KeyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims {
                message: err.to_string(),
            },
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::Decoding {
                message: err.to_string(),
            },
        }
    }
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        if err.is_validation_error() {
            AuthError::invalid_grant(err.to_string())
        } else {
            AuthError::internal(err.to_string())
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported ID token signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` algorithm.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the name used in JWK and JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` for RSA-based algorithms.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(KeyError::invalid_key(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set, as served from the keys endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key (public part only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use, always "sig".
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An asymmetric key pair able to sign and verify JWTs.
pub struct SigningKeyPair {
    kid: String,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key: PublicKeyData,
    created_at: OffsetDateTime,
}

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a fresh key pair for `algorithm` with a random key ID.
    ///
    /// RSA generation is CPU heavy; async callers should run it on a
    /// blocking thread.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM conversion fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, KeyError> {
        if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| KeyError::generation(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(&private_key, LineEnding::LF)
            .map_err(|e| KeyError::generation(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::generation(e.to_string()))?;

        Self::from_rsa_parts(
            uuid::Uuid::new_v4().to_string(),
            algorithm,
            private_pem.as_bytes(),
            &public_pem,
        )
    }

    fn generate_ec() -> Result<Self, KeyError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::generation(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::generation(e.to_string()))?;

        let (decoding_key, public_key) = ec_public_parts(&secret_key)?;
        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads a key pair from PEM.
    ///
    /// RSA keys need both halves (PKCS#8 private, SPKI public). EC keys
    /// derive the public half from the SEC1 private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, KeyError> {
        if algorithm.is_rsa() {
            return Self::from_rsa_parts(kid.into(), algorithm, private_pem.as_bytes(), public_pem);
        }

        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let secret_key = EcSecretKey::from_sec1_pem(private_pem)
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let (decoding_key, public_key) = ec_public_parts(&secret_key)?;

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    fn from_rsa_parts(
        kid: String,
        algorithm: SigningAlgorithm,
        private_pem: &[u8],
        public_pem: &str,
    ) -> Result<Self, KeyError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(private_pem).map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm,
            encoding_key,
            decoding_key,
            public_key: PublicKeyData::Rsa {
                n: public_key.n().to_bytes_be(),
                e: public_key.e().to_bytes_be(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Returns the key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Returns when the key was generated or loaded.
    #[must_use]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Signs `claims` into a compact JWT carrying this key's `kid`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or signing fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, KeyError> {
        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &self.encoding_key).map_err(|e| KeyError::Encoding {
            message: e.to_string(),
        })
    }

    /// Verifies a JWT signed by this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature or any validated claim is wrong.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<TokenData<T>, KeyError> {
        decode(token, &self.decoding_key, validation).map_err(KeyError::from)
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        let (kty, n, e, crv, x, y) = match &self.public_key {
            PublicKeyData::Rsa { n, e } => (
                "RSA",
                Some(URL_SAFE_NO_PAD.encode(n)),
                Some(URL_SAFE_NO_PAD.encode(e)),
                None,
                None,
                None,
            ),
            PublicKeyData::Ec { x, y } => (
                "EC",
                None,
                None,
                Some("P-384".to_string()),
                Some(URL_SAFE_NO_PAD.encode(x)),
                Some(URL_SAFE_NO_PAD.encode(y)),
            ),
        };

        Jwk {
            kty: kty.to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.as_str().to_string(),
            n,
            e,
            crv,
            x,
            y,
        }
    }
}

fn ec_public_parts(secret_key: &EcSecretKey) -> Result<(DecodingKey, PublicKeyData), KeyError> {
    let signing_key = EcSigningKey::from(secret_key);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| KeyError::invalid_key("Missing x coordinate"))?;
    let y = point
        .y()
        .ok_or_else(|| KeyError::invalid_key("Missing y coordinate"))?;

    let decoding_key = DecodingKey::from_ec_components(
        &URL_SAFE_NO_PAD.encode(x.as_slice()),
        &URL_SAFE_NO_PAD.encode(y.as_slice()),
    )
    .map_err(|e| KeyError::invalid_key(e.to_string()))?;

    Ok((
        decoding_key,
        PublicKeyData::Ec {
            x: x.to_vec(),
            y: y.to_vec(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn claims(exp_offset: i64) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            exp: OffsetDateTime::now_utc().unix_timestamp() + exp_offset,
        }
    }

    fn validation(algorithm: SigningAlgorithm) -> Validation {
        let mut validation = Validation::new(algorithm.to_jwt_algorithm());
        validation.validate_aud = false;
        validation
    }

    #[test]
    fn test_ec_sign_verify() {
        let pair = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        let token = pair.sign(&claims(300)).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(pair.kid()));

        let data: TokenData<Claims> = pair.verify(&token, &validation(SigningAlgorithm::ES384)).unwrap();
        assert_eq!(data.claims.sub, "user-1");
    }

    #[test]
    fn test_rsa_sign_verify() {
        let pair = SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap();
        let token = pair.sign(&claims(300)).unwrap();
        let data: TokenData<Claims> = pair.verify(&token, &validation(SigningAlgorithm::RS256)).unwrap();
        assert_eq!(data.claims.sub, "user-1");
    }

    #[test]
    fn test_foreign_key_rejected() {
        let signer = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        let other = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();

        let token = signer.sign(&claims(300)).unwrap();
        let result: Result<TokenData<Claims>, _> =
            other.verify(&token, &validation(SigningAlgorithm::ES384));
        assert!(matches!(result.unwrap_err(), KeyError::InvalidSignature));
    }

    #[test]
    fn test_expired_token_rejected() {
        let pair = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        let token = pair.sign(&claims(-3600)).unwrap();
        let result: Result<TokenData<Claims>, _> =
            pair.verify(&token, &validation(SigningAlgorithm::ES384));
        assert!(matches!(result.unwrap_err(), KeyError::Expired));
    }

    #[test]
    fn test_jwk_export() {
        let ec = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap().to_jwk();
        assert_eq!(ec.kty, "EC");
        assert_eq!(ec.crv.as_deref(), Some("P-384"));
        assert!(ec.n.is_none());

        let rsa = SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap().to_jwk();
        assert_eq!(rsa.kty, "RSA");
        assert_eq!(rsa.alg, "RS256");
        assert!(rsa.n.is_some() && rsa.e.is_some());

        let json = serde_json::to_string(&rsa).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("ES384".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::ES384);
        assert!("HS256".parse::<SigningAlgorithm>().is_err());
    }
}
