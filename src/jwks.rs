// ABOUTME: RS256 key signer exposing a JSON Web Key Set for token verification
// ABOUTME: Generates an ephemeral RSA key pair at startup and signs id_token claims
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! JWKS (JSON Web Key Set) Management
//!
//! The signer holds a single RSA-2048 key pair generated when the process starts.
//! Keys are not persisted: a restart rotates the key and invalidates previously
//! issued `id_token`s, which is acceptable because access and refresh tokens are
//! opaque and validated against the key-value store instead.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mcp_device_gateway::jwks::KeySigner;
//!
//! # fn example() -> mcp_device_gateway::errors::AppResult<()> {
//! let signer = KeySigner::generate("https://forum.example.com")?;
//! let jwks = signer.jwks();
//! assert_eq!(jwks.keys.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::constants::oauth::RSA_KEY_BITS;
use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// Key ID referenced by signed token headers
    pub kid: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// `OpenID Connect` id token claims issued by the code flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer URL
    pub iss: String,
    /// Subject (forum user id)
    pub sub: String,
    /// Audience (client id)
    pub aud: String,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Issued at, seconds since epoch
    pub iat: i64,
}

/// Holds the signing key and its public JWK
pub struct KeySigner {
    kid: String,
    issuer: String,
    jwk: JsonWebKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl KeySigner {
    /// Generate a signer with a fresh RSA-2048 key
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM encoding fails
    pub fn generate(issuer: impl Into<String>) -> AppResult<Self> {
        Self::generate_with_key_size(issuer, RSA_KEY_BITS)
    }

    /// Generate a signer with a configurable key size
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM encoding fails
    pub fn generate_with_key_size(issuer: impl Into<String>, key_size_bits: usize) -> AppResult<Self> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| AppError::internal(format!("Failed to generate RSA private key: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export private key as PEM: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export public key as PEM: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create encoding key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create decoding key: {e}")))?;

        let kid = format!("key_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let jwk = JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            alg: "RS256".to_owned(),
            kid: kid.clone(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        };

        tracing::info!(kid = %kid, bits = key_size_bits, "Generated ephemeral RS256 signing key");

        Ok(Self {
            kid,
            issuer: issuer.into(),
            jwk,
            encoding_key,
            decoding_key,
        })
    }

    /// Key ID of the active key
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Issuer placed in and required of signed tokens
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Public key set for `/.well-known/jwks.json`
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.jwk.clone()],
        }
    }

    /// Sign claims as an RS256 JWT carrying this key's `kid`
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be serialized or signed
    pub fn sign<T: Serialize>(&self, claims: &T) -> AppResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode RS256 JWT: {e}")))
    }

    /// Build and sign an id token for `user_id`, audience `client_id`
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    pub fn sign_id_token(&self, user_id: &str, client_id: &str, ttl_secs: i64) -> AppResult<String> {
        let now = Utc::now().timestamp();
        self.sign(&IdTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_owned(),
            aud: client_id.to_owned(),
            exp: now + ttl_secs,
            iat: now,
        })
    }

    /// Verify a token signed by this key and decode its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the `kid` is unknown, the signature is invalid, or the token
    /// is expired or issued for another audience
    pub fn verify<T: DeserializeOwned>(&self, token: &str, audience: &str) -> AppResult<T> {
        let header = decode_header(token)
            .map_err(|e| AppError::auth_invalid(format!("Failed to decode JWT header: {e}")))?;

        if header.kid.as_deref() != Some(self.kid.as_str()) {
            return Err(AppError::auth_invalid("Unknown key ID"));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::auth_invalid(format!("Failed to verify RS256 JWT: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwk_shape() -> AppResult<()> {
        let signer = KeySigner::generate("https://issuer.test")?;
        let jwks = signer.jwks();

        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.key_use, "sig");
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.kid, signer.kid());
        // 65537
        assert_eq!(key.e, "AQAB");
        assert!(!key.n.contains('='));
        Ok(())
    }
}
