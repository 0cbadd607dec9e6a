// ABOUTME: OAuth 2.0 authorization server facade over the device grant, code flow and rotation
// ABOUTME: Dispatches token requests by grant type and builds RFC 8414 discovery metadata
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::authorization_codes::{AuthorizationCodeStore, NewAuthorizationCode};
use super::codes::verify_pkce;
use super::device_grant::{parse_scopes, DeviceGrantEngine};
use super::models::{
    AuthorizationServerMetadata, AuthorizeRequest, DeviceAuthorizationRequestBody,
    DeviceAuthorizationResponse, RevokeRequest, TokenRequest, TokenResponse,
};
use super::rotation::{RevocationOutcome, TokenRotationEngine};
use super::tokens::IssuedTokens;
use crate::config::OAuthServerConfig;
use crate::constants::oauth::{
    AUTHORIZATION_CODE_GRANT_TYPE, AUTHORIZATION_CODE_SCOPES, DEFAULT_SCOPE, DEVICE_CODE_GRANT_TYPE,
    ID_TOKEN_TTL_SECS, PKCE_METHOD_S256, REFRESH_TOKEN_GRANT_TYPE,
};
use crate::errors::{AppResult, GrantError};
use crate::jwks::KeySigner;
use crate::logging::AppLogger;
use std::sync::Arc;
use url::Url;

/// Failure of the authorization endpoint
#[derive(Debug, Clone)]
pub enum AuthorizeError {
    /// Client or redirect URI cannot be trusted; answer directly
    Direct(GrantError),
    /// Report to the client through its redirect URI
    Redirect {
        /// Validated redirect URI
        redirect_uri: String,
        /// The error to report
        error: GrantError,
        /// Client state to echo
        state: Option<String>,
    },
}

impl AuthorizeError {
    /// Redirect location carrying the error, for the `Redirect` case
    #[must_use]
    pub fn redirect_location(&self) -> Option<String> {
        match self {
            Self::Direct(_) => None,
            Self::Redirect {
                redirect_uri,
                error,
                state,
            } => {
                let mut url = Url::parse(redirect_uri).ok()?;
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("error", error.kind.as_str());
                    query.append_pair("error_description", &error.message);
                    if let Some(state) = state {
                        query.append_pair("state", state);
                    }
                }
                Some(url.to_string())
            }
        }
    }
}

/// OAuth 2.0 Authorization Server
pub struct OAuth2AuthorizationServer {
    config: OAuthServerConfig,
    device_grant: Arc<DeviceGrantEngine>,
    rotation: Arc<TokenRotationEngine>,
    auth_codes: AuthorizationCodeStore,
    signer: Arc<KeySigner>,
}

impl OAuth2AuthorizationServer {
    /// Assemble the server from its engines
    #[must_use]
    pub const fn new(
        config: OAuthServerConfig,
        device_grant: Arc<DeviceGrantEngine>,
        rotation: Arc<TokenRotationEngine>,
        auth_codes: AuthorizationCodeStore,
        signer: Arc<KeySigner>,
    ) -> Self {
        Self {
            config,
            device_grant,
            rotation,
            auth_codes,
            signer,
        }
    }

    /// Server settings
    #[must_use]
    pub const fn config(&self) -> &OAuthServerConfig {
        &self.config
    }

    /// Device grant engine
    #[must_use]
    pub const fn device_grant(&self) -> &Arc<DeviceGrantEngine> {
        &self.device_grant
    }

    /// Refresh rotation engine
    #[must_use]
    pub const fn rotation(&self) -> &Arc<TokenRotationEngine> {
        &self.rotation
    }

    /// Id token signer
    #[must_use]
    pub const fn signer(&self) -> &Arc<KeySigner> {
        &self.signer
    }

    /// Handle `POST /oauth/device_authorization`
    ///
    /// # Errors
    ///
    /// Returns `invalid_client`, `invalid_scope` or `server_error`
    pub async fn device_authorization(
        &self,
        request: DeviceAuthorizationRequestBody,
    ) -> Result<DeviceAuthorizationResponse, GrantError> {
        self.device_grant
            .create_authorization(&request.client_id, request.scope.as_deref())
            .await
    }

    /// Handle `POST /oauth/token`
    ///
    /// # Errors
    ///
    /// Returns the grant-specific `OAuth2` error
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, GrantError> {
        match request.grant_type.as_str() {
            DEVICE_CODE_GRANT_TYPE => self.handle_device_code_grant(&request).await,
            AUTHORIZATION_CODE_GRANT_TYPE => self.handle_authorization_code_grant(&request).await,
            REFRESH_TOKEN_GRANT_TYPE => self.handle_refresh_token_grant(&request).await,
            "" => Err(GrantError::invalid_request("grant_type is required")),
            other => Err(GrantError::unsupported_grant_type(other)),
        }
    }

    fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, GrantError> {
        value
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GrantError::invalid_request(format!("{name} is required")))
    }

    async fn handle_device_code_grant(&self, request: &TokenRequest) -> Result<TokenResponse, GrantError> {
        let device_code = Self::required(request.device_code.as_ref(), "device_code")?;
        let client_id = Self::required(request.client_id.as_ref(), "client_id")?;

        let issued = self.device_grant.poll(device_code, client_id).await?;
        Ok(Self::token_response(issued, None))
    }

    async fn handle_authorization_code_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, GrantError> {
        let code = Self::required(request.code.as_ref(), "code")?;
        let redirect_uri = Self::required(request.redirect_uri.as_ref(), "redirect_uri")?;
        let client_id = Self::required(request.client_id.as_ref(), "client_id")?;
        let code_verifier = Self::required(request.code_verifier.as_ref(), "code_verifier")?;
        let resource = Self::required(request.resource.as_ref(), "resource")?;

        if client_id != self.config.client_id {
            return Err(GrantError::invalid_client(format!(
                "Unknown client_id '{client_id}'"
            )));
        }

        // Consumed before verification so a failed exchange cannot be retried
        let grant = self.auth_codes.consume(code).await?;

        if grant.client_id != client_id {
            return Err(GrantError::invalid_grant("Code was issued to another client"));
        }
        if grant.redirect_uri != redirect_uri {
            return Err(GrantError::invalid_grant("redirect_uri does not match"));
        }
        if grant.resource != resource {
            return Err(GrantError::invalid_grant("resource does not match"));
        }
        verify_pkce(code_verifier, &grant.code_challenge)?;

        let issued = self
            .device_grant
            .generate_device_tokens(&grant.user_id, client_id, &grant.scopes)
            .await?;

        let id_token = if grant.scopes.iter().any(|s| s == "openid") {
            Some(
                self.signer
                    .sign_id_token(&grant.user_id, client_id, ID_TOKEN_TTL_SECS)?,
            )
        } else {
            None
        };

        AppLogger::log_oauth_event(client_id, AUTHORIZATION_CODE_GRANT_TYPE, "token_issued", true);
        Ok(Self::token_response(issued, id_token))
    }

    async fn handle_refresh_token_grant(&self, request: &TokenRequest) -> Result<TokenResponse, GrantError> {
        let refresh_token = Self::required(request.refresh_token.as_ref(), "refresh_token")?;
        let issued = self
            .rotation
            .refresh(refresh_token, request.client_id.as_deref())
            .await?;
        Ok(Self::token_response(issued, None))
    }

    fn token_response(issued: IssuedTokens, id_token: Option<String>) -> TokenResponse {
        TokenResponse {
            token_type: issued.token_type().to_owned(),
            expires_in: issued.expires_in(),
            scope: issued.scope(),
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            id_token,
        }
    }

    /// Handle `GET /oauth/authorize` for an authenticated forum user
    ///
    /// Returns the redirect location carrying the new code.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError::Direct`] for an unknown client or redirect URI and
    /// [`AuthorizeError::Redirect`] for everything reportable to the client
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: &str,
    ) -> Result<String, AuthorizeError> {
        if request.client_id != self.config.client_id {
            return Err(AuthorizeError::Direct(GrantError::invalid_client(format!(
                "Unknown client_id '{}'",
                request.client_id
            ))));
        }
        if !self.config.redirect_uris.contains(&request.redirect_uri)
            || Url::parse(&request.redirect_uri).is_err()
        {
            return Err(AuthorizeError::Direct(GrantError::invalid_request(
                "Invalid redirect_uri",
            )));
        }

        let redirect_error = |error: GrantError| AuthorizeError::Redirect {
            redirect_uri: request.redirect_uri.clone(),
            error,
            state: request.state.clone(),
        };

        if request.response_type != "code" {
            return Err(redirect_error(GrantError::invalid_request(
                "Only 'code' response_type is supported",
            )));
        }

        let code_challenge = request
            .code_challenge
            .clone()
            .filter(|c| (43..=128).contains(&c.len()))
            .ok_or_else(|| {
                redirect_error(GrantError::invalid_request(
                    "code_challenge is required and must be 43-128 characters",
                ))
            })?;
        if request.code_challenge_method.as_deref().unwrap_or(PKCE_METHOD_S256) != PKCE_METHOD_S256 {
            return Err(redirect_error(GrantError::invalid_request(
                "code_challenge_method must be 'S256'",
            )));
        }

        let resource = request
            .resource
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| redirect_error(GrantError::invalid_request("resource is required")))?;

        let mut scopes = parse_scopes(request.scope.as_deref());
        if scopes.is_empty() {
            scopes.push(DEFAULT_SCOPE.to_owned());
        }
        if let Some(unsupported) = scopes
            .iter()
            .find(|s| !AUTHORIZATION_CODE_SCOPES.contains(&s.as_str()))
        {
            return Err(redirect_error(GrantError::invalid_scope(format!(
                "Scope '{unsupported}' is not supported"
            ))));
        }

        let code = self
            .auth_codes
            .issue(NewAuthorizationCode {
                user_id: user_id.to_owned(),
                client_id: request.client_id.clone(),
                scopes,
                code_challenge,
                redirect_uri: request.redirect_uri.clone(),
                resource,
                state: request.state.clone(),
            })
            .await
            .map_err(|e| redirect_error(e.into()))?;

        let mut location = Url::parse(&request.redirect_uri)
            .map_err(|_| AuthorizeError::Direct(GrantError::invalid_request("Invalid redirect_uri")))?;
        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &request.state {
                query.append_pair("state", state);
            }
        }

        AppLogger::log_oauth_event(&request.client_id, AUTHORIZATION_CODE_GRANT_TYPE, "code_issued", true);
        Ok(location.to_string())
    }

    /// Handle `POST /oauth/revoke` (RFC 7009)
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails; unknown tokens succeed
    pub async fn revoke(&self, request: RevokeRequest) -> AppResult<RevocationOutcome> {
        let outcome = self
            .rotation
            .revoke_any(&request.token, request.token_type_hint.as_deref())
            .await?;
        tracing::info!(outcome = ?outcome, "Processed token revocation");
        Ok(outcome)
    }

    /// RFC 8414 metadata document
    #[must_use]
    pub fn metadata(&self) -> AuthorizationServerMetadata {
        AuthorizationServerMetadata {
            issuer: self.config.issuer_url.clone(),
            authorization_endpoint: self.config.authorization_endpoint(),
            token_endpoint: self.config.token_endpoint(),
            device_authorization_endpoint: self.config.device_authorization_endpoint(),
            revocation_endpoint: self.config.revocation_endpoint(),
            jwks_uri: self.config.jwks_uri(),
            grant_types_supported: vec![
                AUTHORIZATION_CODE_GRANT_TYPE.to_owned(),
                REFRESH_TOKEN_GRANT_TYPE.to_owned(),
                DEVICE_CODE_GRANT_TYPE.to_owned(),
            ],
            response_types_supported: vec!["code".to_owned()],
            scopes_supported: AUTHORIZATION_CODE_SCOPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            code_challenge_methods_supported: vec![PKCE_METHOD_S256.to_owned()],
            token_endpoint_auth_methods_supported: vec!["none".to_owned()],
        }
    }
}
