// ABOUTME: Secure random code generation, token hashing and PKCE verification
// ABOUTME: Shared by the device grant, the redirect flow and the token store
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::oauth::{
    PKCE_VERIFIER_MAX_LEN, PKCE_VERIFIER_MIN_LEN, TOKEN_BYTES, USER_CODE_CHARSET,
    USER_CODE_GROUP_LEN,
};
use crate::errors::{AppError, AppResult, GrantError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

fn fill_random(bytes: &mut [u8]) -> AppResult<()> {
    SystemRandom::new().fill(bytes).map_err(|e| {
        tracing::error!(
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes: {}",
            e
        );
        AppError::internal("System RNG failure - server cannot operate securely")
    })
}

/// Generate 32 random bytes, base64url encoded without padding (43 characters)
///
/// Used for device codes, access tokens, refresh tokens and authorization codes.
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_token() -> AppResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    fill_random(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a human-typeable user code such as `BCDF-GHJK`
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_user_code() -> AppResult<String> {
    // Largest multiple of the charset size that fits in a byte; higher bytes are rejected
    // so every symbol is equally likely
    let charset_len = USER_CODE_CHARSET.len();
    let limit = (256 / charset_len) * charset_len;

    let mut symbols = Vec::with_capacity(USER_CODE_GROUP_LEN * 2);
    let mut buffer = [0u8; 16];
    while symbols.len() < USER_CODE_GROUP_LEN * 2 {
        fill_random(&mut buffer)?;
        for byte in buffer {
            let value = usize::from(byte);
            if value < limit && symbols.len() < USER_CODE_GROUP_LEN * 2 {
                symbols.push(char::from(USER_CODE_CHARSET[value % charset_len]));
            }
        }
    }

    let (first, second) = symbols.split_at(USER_CODE_GROUP_LEN);
    Ok(format!(
        "{}-{}",
        first.iter().collect::<String>(),
        second.iter().collect::<String>()
    ))
}

/// Canonical form of a user-entered code: uppercase, hyphen restored, whitespace dropped
///
/// Returns `None` when the input cannot be a user code.
#[must_use]
pub fn normalize_user_code(input: &str) -> Option<String> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if compact.len() != USER_CODE_GROUP_LEN * 2
        || !compact.bytes().all(|b| USER_CODE_CHARSET.contains(&b))
    {
        return None;
    }

    let (first, second) = compact.split_at(USER_CODE_GROUP_LEN);
    Some(format!("{first}-{second}"))
}

/// SHA-256 of the decoded token bytes, hex encoded
///
/// Returns `None` for strings that are not base64url, which no issued token can be.
#[must_use]
pub fn hash_token(token: &str) -> Option<String> {
    let raw = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
    if raw.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(&raw)))
}

/// `base64url(SHA256(verifier))`, the S256 code challenge
#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Verify a PKCE code verifier against the stored S256 challenge
///
/// # Errors
///
/// Returns `invalid_grant` when the verifier is malformed or does not match
pub fn verify_pkce(verifier: &str, stored_challenge: &str) -> Result<(), GrantError> {
    // RFC 7636 Section 4.1: 43-128 unreserved characters
    if verifier.len() < PKCE_VERIFIER_MIN_LEN || verifier.len() > PKCE_VERIFIER_MAX_LEN {
        return Err(GrantError::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(GrantError::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let computed = pkce_challenge(verifier);
    if computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into() {
        Ok(())
    } else {
        tracing::warn!("PKCE verification failed - code_verifier does not match code_challenge");
        Err(GrantError::invalid_grant("Invalid code_verifier"))
    }
}
