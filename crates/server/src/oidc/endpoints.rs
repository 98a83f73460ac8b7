//! OpenID Connect HTTP endpoints.
//!
//! The handlers parse the wire format and drive [`ProviderStorage`]; all
//! protocol state lives behind that trait.
//!
//! - `GET /authorize` - Authorization endpoint
//! - `GET /authorize/callback` - Code issuance once login has completed
//! - `POST /token` - Token endpoint (authorization code grant only)
//! - `GET /userinfo` - UserInfo endpoint
//! - `GET /keys` - JWKS
//! - `GET /.well-known/openid-configuration` - Discovery document
//! - `POST /revoke`, `POST /introspect`, `GET /end_session` - unsupported, fail with 501

use crate::error::{ErrorResponse, ProviderError, ProviderResult};
use crate::oidc::OIDC_TAG;
use crate::oidc::auth_request::{AuthRequest, AuthRequestParams};
use crate::oidc::client::{CLOCK_SKEW, OFFLINE_ACCESS};
use crate::oidc::claims::UserInfo;
use crate::oidc::keys::{JwkSet, KEY_ID, SIGNING_ALGORITHM};
use crate::oidc::state::OidcState;
use crate::oidc::storage::ProviderStorage;
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OpenID Connect router. Paths are relative to the issuer path.
pub fn router(state: OidcState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(authorize_callback))
        .routes(routes!(token))
        .routes(routes!(userinfo))
        .routes(routes!(keys))
        .routes(routes!(openid_configuration))
        .routes(routes!(revoke))
        .routes(routes!(introspect))
        .routes(routes!(end_session))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Must be `code`
    pub response_type: String,
    pub client_id: String,
    /// Must exactly match a registered redirect URI
    pub redirect_uri: String,
    /// Space-separated scopes; `openid` is required
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Only `query` is supported
    pub response_mode: Option<String>,
    pub acr_values: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackRequest {
    /// Auth request id
    pub id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    /// Rejected: clients authenticate with HTTP Basic only
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenParam {
    pub token: String,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EndSessionRequest {
    pub id_token_hint: Option<String>,
    pub client_id: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub request_parameter_supported: bool,
}

/// Claims of the access tokens this provider mints. `jti` is the id of the
/// stored token and `sub` the encoded subject it was issued to.
#[derive(Debug, Serialize, Deserialize)]
struct AccessTokenClaims {
    iss: String,
    sub: String,
    aud: String,
    jti: String,
    iat: i64,
    exp: i64,
    scope: String,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Authorization endpoint.
#[tracing::instrument(skip(state, params), fields(client_id = %params.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OIDC_TAG,
    operation_id = "OIDC Authorize",
    summary = "Start the authorization code flow",
    description = "Validates the request and redirects the browser to the login page. Once the user \
                   has authenticated, the login page continues the flow at `/authorize/callback`.\n\n\
                   Errors are returned to the client's redirect URI when it is valid, and as JSON otherwise.\n\n\
                   **Supported scopes:** `openid`, `profile`, `email`, `permissions`, `pls_<group>`, `picture`, `year_tag`. \
                   `offline_access` is accepted but never yields a refresh token.",
    params(AuthorizeRequest),
    responses(
        (status = 303, description = "Redirect to the login page, or back to the client with an error"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OidcState>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, ProviderError> {
    let storage = state.storage();
    let client = storage.client_by_client_id(&params.client_id).await?;
    if !client.is_redirect_uri_allowed(&params.redirect_uri) {
        return Err(ProviderError::bad_request("redirect_uri is not registered"));
    }

    // From here on errors go back to the client.
    let fail = |error: ProviderError| {
        error_redirect(&params.redirect_uri, params.state.as_deref(), &error)
    };

    if !client.response_types().contains(&params.response_type.as_str()) {
        return Ok(fail(ProviderError::UnsupportedResponseType(
            params.response_type.clone(),
        )));
    }
    if params.response_mode.as_deref().is_some_and(|mode| mode != "query") {
        return Ok(fail(ProviderError::bad_request(
            "only the `query` response mode is supported",
        )));
    }

    let mut scopes = Vec::new();
    for scope in params.scope.as_deref().unwrap_or_default().split_whitespace() {
        if scope == OFFLINE_ACCESS {
            continue;
        }
        if !client.is_scope_allowed(scope) {
            return Ok(fail(ProviderError::InvalidScope(format!(
                "`{scope}` is not supported"
            ))));
        }
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    if !scopes.iter().any(|s| s == "openid") {
        return Ok(fail(ProviderError::InvalidScope(
            "the `openid` scope is required".into(),
        )));
    }

    let request = storage
        .create_auth_request(AuthRequestParams {
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            scopes,
            response_type: params.response_type.clone(),
            response_mode: params.response_mode.clone(),
            state: params.state.clone(),
            nonce: params.nonce.clone(),
            acr_values: params.acr_values.clone(),
        })
        .await?;

    let next_url = state.provider.auth_callback_url(&request.id.to_string());
    Ok(Redirect::to(&client.login_url(&next_url)).into_response())
}

/// Continuation after login: issues the authorization code.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/authorize/callback",
    tag = OIDC_TAG,
    operation_id = "OIDC Authorize Callback",
    summary = "Issue the authorization code",
    description = "Where the login page sends the browser after authentication. Issues an \
                   authorization code and redirects back to the client.",
    params(CallbackRequest),
    responses(
        (status = 303, description = "Redirect to the client with `code` and `state`"),
        (status = 400, description = "Unknown or not yet authenticated auth request", body = ErrorResponse),
    )
)]
pub async fn authorize_callback(
    State(state): State<OidcState>,
    Query(params): Query<CallbackRequest>,
) -> Result<Response, ProviderError> {
    let storage = state.storage();
    let request = storage
        .auth_request_by_id(&params.id)
        .await
        .map_err(|e| match e {
            ProviderError::NotFound(_) => ProviderError::bad_request("unknown auth request"),
            other => other,
        })?;
    if !request.done() {
        return Err(ProviderError::bad_request("user has not authenticated yet"));
    }

    let code = OidcState::generate_code()
        .map_err(|e| ProviderError::Internal(format!("failed to generate code: {e}")))?;
    storage.save_auth_code(&params.id, &code).await?;

    let location = redirect_with(
        request.redirect_uri(),
        &[("code", code.as_str())],
        request.state(),
    )?;
    Ok(Redirect::to(&location).into_response())
}

/// Token endpoint.
#[tracing::instrument(skip(state, headers, params), fields(grant_type = %params.grant_type))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OIDC_TAG,
    operation_id = "OIDC Token",
    summary = "Exchange an authorization code for tokens",
    description = "Exchanges an authorization code for an access token and, when `openid` was \
                   granted, an ID token.\n\n\
                   **Client authentication:** HTTP Basic (`client_secret_basic`) only.\n\n\
                   **Grant types:** `authorization_code`. `refresh_token` fails with 501.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or request", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 501, description = "Refresh tokens are not supported", body = ErrorResponse),
        (status = 502, description = "An upstream claim source failed", body = ErrorResponse),
    ),
    security(("client_auth" = []))
)]
pub async fn token(
    State(state): State<OidcState>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, ProviderError> {
    let storage = state.storage();
    if params.client_secret.is_some() {
        return Err(ProviderError::InvalidClient(
            "client_secret_post is not supported".into(),
        ));
    }
    let (client_id, secret) = basic_credentials(&headers)?;
    storage.authorize_client_id_secret(&client_id, &secret).await?;

    let response = match params.grant_type.as_str() {
        "authorization_code" => exchange_code(&state, &client_id, &params).await?,
        "refresh_token" => {
            let refresh_token = params.refresh_token.as_deref().unwrap_or_default();
            storage.token_request_by_refresh_token(refresh_token).await?;
            return Err(ProviderError::Unimplemented("refresh token exchange"));
        }
        other => return Err(ProviderError::UnsupportedGrantType(other.to_string())),
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OIDC_TAG,
    operation_id = "OIDC UserInfo",
    summary = "Claims about the authenticated user",
    description = "Returns the claims granted to the access token.\n\n\
                   **Claims by scope:**\n\
                   - `openid`: `sub`\n\
                   - `profile`: `name`, `given_name`, `family_name`\n\
                   - `email`: `email`, `email_verified`\n\
                   - `permissions`: `permissions`\n\
                   - `pls_<group>`: `pls_<group>`\n\
                   - `picture`: `picture`\n\
                   - `year_tag`: `year_tag`\n\n\
                   Guests never receive `permissions`, `pls_*`, `picture` or `year_tag`.",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Claims", body = UserInfo),
        (status = 400, description = "Token not valid for this subject", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 502, description = "An upstream claim source failed", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OidcState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, ProviderError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ProviderError::InvalidToken("missing bearer token".into()))?;

    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.set_issuer(&[state.issuer()]);
    validation.validate_aud = false;
    validation.leeway = CLOCK_SKEW.as_secs();
    let claims = jsonwebtoken::decode::<AccessTokenClaims>(
        bearer,
        state.storage().signing_key().decoding_key(),
        &validation,
    )
    .map_err(|e| ProviderError::InvalidToken(e.to_string()))?
    .claims;

    let info = state
        .storage()
        .userinfo_from_token(&claims.jti, &claims.sub)
        .await?;
    Ok(Json(info))
}

/// JSON Web Key Set.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/keys",
    tag = OIDC_TAG,
    operation_id = "OIDC JWKS",
    summary = "Public signing keys",
    description = "The key set used to verify ID tokens. There is exactly one key and it is never rotated.",
    responses(
        (status = 200, description = "Key set", body = JwkSet),
    )
)]
pub async fn keys(State(state): State<OidcState>) -> Json<JwkSet> {
    Json(state.storage().key_set())
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OIDC_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Metadata about this provider: endpoints, supported scopes, claims, grant \
                   types and signing algorithm.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OidcState>) -> Json<OpenIdConfiguration> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    Json(OpenIdConfiguration {
        issuer: state.issuer().to_string(),
        authorization_endpoint: state.endpoint("/authorize"),
        token_endpoint: state.endpoint("/token"),
        userinfo_endpoint: state.endpoint("/userinfo"),
        jwks_uri: state.endpoint("/keys"),
        response_types_supported: strings(&["code"]),
        response_modes_supported: strings(&["query"]),
        grant_types_supported: strings(&["authorization_code"]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&["RS256"]),
        scopes_supported: strings(&[
            "openid",
            "profile",
            "email",
            "permissions",
            "picture",
            "year_tag",
            OFFLINE_ACCESS,
        ]),
        token_endpoint_auth_methods_supported: strings(&["client_secret_basic"]),
        claims_supported: strings(&[
            "sub",
            "name",
            "given_name",
            "family_name",
            "email",
            "email_verified",
            "picture",
            "year_tag",
            "permissions",
        ]),
        request_parameter_supported: false,
    })
}

/// Token revocation. Not supported.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OIDC_TAG,
    operation_id = "OIDC Revoke",
    summary = "Token revocation (unsupported)",
    description = "Access tokens live for one minute and refresh tokens are never issued, so \
                   revocation is not supported. Always fails with 501.",
    request_body(content = TokenParam, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 501, description = "Not implemented", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OidcState>,
    Form(params): Form<TokenParam>,
) -> Result<Response, ProviderError> {
    state.storage().revoke_token(&params.token, None, "").await?;
    Err(ProviderError::Unimplemented("token revocation"))
}

/// Token introspection. Not supported.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OIDC_TAG,
    operation_id = "OIDC Introspect",
    summary = "Token introspection (unsupported)",
    description = "Always fails with 501.",
    request_body(content = TokenParam, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 501, description = "Not implemented", body = ErrorResponse),
    )
)]
pub async fn introspect(
    State(state): State<OidcState>,
    Form(params): Form<TokenParam>,
) -> Result<Response, ProviderError> {
    state
        .storage()
        .introspection_from_token(&params.token, "", "")
        .await?;
    Err(ProviderError::Unimplemented("token introspection"))
}

/// RP-initiated logout. Not supported.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/end_session",
    tag = OIDC_TAG,
    operation_id = "OIDC End Session",
    summary = "End session (unsupported)",
    description = "Logout propagation is not supported. Always fails with 501.",
    params(EndSessionRequest),
    responses(
        (status = 501, description = "Not implemented", body = ErrorResponse),
    )
)]
pub async fn end_session(
    State(state): State<OidcState>,
    Query(params): Query<EndSessionRequest>,
) -> Result<Response, ProviderError> {
    state
        .storage()
        .terminate_session("", params.client_id.as_deref().unwrap_or_default())
        .await?;
    Err(ProviderError::Unimplemented("session termination"))
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn exchange_code(
    state: &OidcState,
    client_id: &str,
    params: &TokenRequest,
) -> ProviderResult<TokenResponse> {
    let storage = state.storage();
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| ProviderError::bad_request("code is required"))?;
    let request = storage.auth_request_by_code(code).await?;

    if request.client_id() != client_id {
        tracing::warn!(client_id, "Code presented by a client it was not issued to");
        return Err(ProviderError::InvalidGrant("code was issued to another client".into()));
    }
    if params.redirect_uri.as_deref() != Some(request.redirect_uri()) {
        return Err(ProviderError::InvalidGrant("redirect_uri does not match".into()));
    }
    if !request.done() {
        return Err(ProviderError::InvalidGrant("auth request not authenticated".into()));
    }

    // Consume the code before minting anything.
    storage.delete_auth_request(&request.id.to_string()).await?;

    let issued = storage.create_access_token(&request).await?;
    let now = OffsetDateTime::now_utc();
    let scope = request.scopes().join(" ");
    let access_claims = AccessTokenClaims {
        iss: state.issuer().to_string(),
        sub: request.subject.clone(),
        aud: client_id.to_string(),
        jti: issued.id.to_string(),
        iat: now.unix_timestamp(),
        exp: issued.expires_at.unix_timestamp(),
        scope: scope.clone(),
    };
    let access_token = sign(storage, &access_claims)?;

    let id_token = if request.scopes().iter().any(|s| s == "openid") {
        Some(id_token(state, &request, now).await?)
    } else {
        None
    };

    tracing::info!(client_id, auth_request_id = %request.id, "Tokens issued");
    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: (issued.expires_at - now).whole_seconds(),
        id_token,
        scope,
    })
}

/// ID token with the userinfo claims asserted in it.
async fn id_token(
    state: &OidcState,
    request: &AuthRequest,
    now: OffsetDateTime,
) -> ProviderResult<String> {
    let storage = state.storage();
    let client = storage.client_by_client_id(request.client_id()).await?;
    let info = storage
        .userinfo_from_scopes(&request.subject, request.client_id(), request.scopes())
        .await?;

    let mut claims = if client.id_token_userinfo_claims_assertion() {
        info.to_claims()?
    } else {
        serde_json::Map::new()
    };
    if !claims.contains_key("sub") {
        let identity = state.provider.identity(&request.subject).await?;
        claims.insert("sub".into(), identity.id().into());
    }
    let expires = now + client.id_token_lifetime();
    claims.insert("iss".into(), state.issuer().into());
    claims.insert("aud".into(), request.audience().into());
    claims.insert("azp".into(), request.client_id().into());
    claims.insert("iat".into(), now.unix_timestamp().into());
    claims.insert("exp".into(), expires.unix_timestamp().into());
    if let Some(nonce) = request.nonce() {
        claims.insert("nonce".into(), nonce.into());
    }
    if !request.acr().is_empty() {
        claims.insert("acr".into(), request.acr().into());
    }
    sign(storage, &claims)
}

fn sign<T: Serialize>(storage: &dyn ProviderStorage, claims: &T) -> ProviderResult<String> {
    let mut header = Header::new(SIGNING_ALGORITHM);
    header.kid = Some(KEY_ID.to_string());
    jsonwebtoken::encode(&header, claims, storage.signing_key().encoding_key())
        .map_err(|e| ProviderError::Internal(format!("failed to sign token: {e}")))
}

/// `client_secret_basic` credentials; both halves are form-urlencoded.
fn basic_credentials(headers: &HeaderMap) -> ProviderResult<(String, String)> {
    let invalid = || ProviderError::InvalidClient("missing or malformed Basic credentials".into());
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or_else(invalid)?;
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(invalid)?;
    let id = urlencoding::decode(id).map_err(|_| invalid())?;
    let secret = urlencoding::decode(secret).map_err(|_| invalid())?;
    Ok((id.into_owned(), secret.into_owned()))
}

fn redirect_with(
    redirect_uri: &str,
    pairs: &[(&str, &str)],
    state: Option<&str>,
) -> ProviderResult<String> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| ProviderError::Internal(format!("stored redirect_uri is invalid: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

/// Report an authorization error to the client through its redirect URI.
fn error_redirect(redirect_uri: &str, state: Option<&str>, error: &ProviderError) -> Response {
    tracing::debug!(error = %error, "Authorization request rejected");
    let description = error.public_description().unwrap_or_default();
    match redirect_with(
        redirect_uri,
        &[
            ("error", error.oauth_error_code()),
            ("error_description", description.as_str()),
        ],
        state,
    ) {
        Ok(location) => Redirect::to(&location).into_response(),
        Err(e) => e.into_response(),
    }
}
