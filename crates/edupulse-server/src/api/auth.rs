//! Authentication API handlers

use crate::api::AppJson;
use crate::auth::{
    email_fingerprint, generate_refresh_token, hash_password_blocking, hash_refresh_token,
    verify_password_blocking,
};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::observability::{AuditEntry, AuditEventType, AuditLogger};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 200;

// ============================================================================
// GUARDS
// ============================================================================

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn require_auth(state: &AppState, headers: &HeaderMap) -> ApiResult<Claims> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing auth token".to_string()))?;
    state.tokens.verify_access_token(token)
}

/// Teacher or admin
pub fn require_staff(state: &AppState, headers: &HeaderMap) -> ApiResult<Claims> {
    let claims = require_auth(state, headers)?;
    if !claims.role.is_staff() {
        return Err(ApiError::forbidden("Teacher or admin role required"));
    }
    Ok(claims)
}

pub fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<Claims> {
    let claims = require_auth(state, headers)?;
    if claims.role != Role::Admin {
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(claims)
}

fn account_is_active(user: Option<&User>) -> ApiResult<()> {
    match user {
        Some(user) if user.deleted_at.is_none() => Ok(()),
        _ => Err(ApiError::Unauthorized("Account no longer exists".to_string())),
    }
}

/// Access tokens outlive account erasure by up to their TTL. Anything that
/// writes in the caller's name checks the account first.
pub async fn ensure_active(state: &AppState, claims: &Claims) -> ApiResult<()> {
    let user = queries::get_user(&state.db, &claims.sub).await?;
    account_is_active(user.as_ref())
}

// ============================================================================
// VALIDATION
// ============================================================================

fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request("Email is too long"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn requested_role(raw: Option<&str>) -> ApiResult<Role> {
    let role = match raw {
        None => Role::Student,
        Some(r) => Role::parse(r).ok_or_else(|| ApiError::bad_request("Invalid role"))?,
    };
    if role == Role::Admin {
        return Err(ApiError::forbidden("Admin accounts cannot be self-registered"));
    }
    Ok(role)
}

/// Open a refresh session and mint the access token that goes with it
async fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let (access_token, expires_at) = state.tokens.issue_access_token(&user.id, user.role)?;
    let refresh_token = generate_refresh_token();
    let session = queries::create_session(
        &state.db,
        &user.id,
        &hash_refresh_token(&refresh_token),
        state.tokens.refresh_expiry(),
    )
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_at,
        refresh_expires_at: session.expires_at,
    })
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let name = crate::api::require_text(&req.name, "Name", MAX_NAME_LEN)?;
    let role = requested_role(req.role.as_deref())?;

    let password_hash = hash_password_blocking(&req.password).await?;
    let user = queries::create_user(&state.db, &email, &password_hash, name, role)
        .await?
        .ok_or_else(|| ApiError::Conflict("Email already registered".to_string()))?;

    let tokens = issue_tokens(&state, &user).await?;

    AuditLogger::log(
        &state,
        AuditEntry::new(AuditEventType::UserRegistered)
            .entity("user", &user.id)
            .actor(&user.id, Some(role.as_str())),
    )
    .await;
    info!(user = %user.id, role = role.as_str(), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user,
            tokens,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let credentials = match queries::get_user_credentials(&state.db, &email).await? {
        Some((user, hash)) => Some((verify_password_blocking(&req.password, &hash).await?, user)),
        None => None,
    };
    let user = match credentials {
        Some((true, user)) => user,
        _ => {
            let who = email_fingerprint(&email);
            warn!(who = %who, "Failed login");
            AuditLogger::auth(&state, &who, false, Some("Invalid credentials")).await;
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }
    };

    let tokens = issue_tokens(&state, &user).await?;
    AuditLogger::auth(&state, &user.id, true, None).await;

    Ok(Json(AuthResponse {
        success: true,
        user,
        tokens,
    }))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let presented = req.refresh_token.trim();
    if presented.is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }

    let refresh_token = generate_refresh_token();
    let session = queries::rotate_session(
        &state.db,
        &hash_refresh_token(presented),
        &hash_refresh_token(&refresh_token),
        state.tokens.refresh_expiry(),
    )
    .await?
    .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".to_string()))?;

    let user = queries::get_user(&state.db, &session.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".to_string()))?;
    let (access_token, expires_at) = state.tokens.issue_access_token(&user.id, user.role)?;

    AuditLogger::log(
        &state,
        AuditEntry::new(AuditEventType::SessionRefreshed)
            .entity("session", &session.id)
            .actor(&user.id, Some(user.role.as_str())),
    )
    .await;

    Ok(Json(AuthResponse {
        success: true,
        user,
        tokens: TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_at,
            refresh_expires_at: session.expires_at,
        },
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let presented = req.refresh_token.trim();
    if presented.is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }

    let revoked = queries::revoke_session(&state.db, &hash_refresh_token(presented)).await?;
    if revoked {
        AuditLogger::log(&state, AuditEntry::new(AuditEventType::SessionRevoked)).await;
    }

    Ok(Json(serde_json::json!({ "success": true, "revoked": revoked })))
}

pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let claims = require_auth(&state, &headers)?;
    let user = queries::get_user(&state.db, &claims.sub)
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_erased_accounts_are_inactive() {
        let mut user = User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            role: Role::Student,
            created_at: 0,
            deleted_at: None,
        };
        assert!(account_is_active(Some(&user)).is_ok());

        user.deleted_at = Some(1_700_000_000);
        assert!(matches!(
            account_is_active(Some(&user)),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(account_is_active(None).is_err());
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("").is_err());
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email(&format!("{}@x.io", "a".repeat(260))).is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_requested_role() {
        assert_eq!(requested_role(None).unwrap(), Role::Student);
        assert_eq!(requested_role(Some("teacher")).unwrap(), Role::Teacher);
        assert!(matches!(
            requested_role(Some("admin")),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            requested_role(Some("wizard")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
