use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::types::{JsonBody, TokenRequest, TokenResponse};
use crate::db::{AccessToken, AccessTokenRepo, DbError, UserRepo};
use crate::server::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub admin: bool,
    pub trusted_member: bool,
}

/// Named authorization policies checked before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Any authenticated caller.
    Authenticated,
    /// May create and edit content. Admins qualify too.
    TrustedMember,
    /// May delete content.
    Admin,
}

impl Policy {
    pub fn check(self, caller: Option<&Caller>) -> Result<(), ApiError> {
        let caller = caller.ok_or(ApiError::Unauthorized)?;
        let allowed = match self {
            Policy::Authenticated => true,
            Policy::TrustedMember => caller.admin || caller.trusted_member,
            Policy::Admin => caller.admin,
        };
        if allowed {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = req.username.trim();

    let user = match state.db.get_user(username).await {
        Ok(user) => user,
        Err(DbError::NotFound(_)) => {
            debug!(username, "login for unknown user");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    let password_ok = bcrypt::verify(&req.password, &user.password).unwrap_or(false);
    if !password_ok {
        warn!(username, "login with wrong password");
        return Err(ApiError::Unauthorized);
    }

    let now = chrono::Utc::now();
    let hours = state.config.auth.token_lifetime_hours;
    let expires = chrono::Duration::try_hours(hours)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ApiError::Internal(format!("token lifetime of {} hours is out of range", hours)))?;
    let token = AccessToken {
        token: Uuid::new_v4().to_string(),
        userid: user.id.clone(),
        created: Some(now),
        expires: Some(expires),
    };
    state.db.upsert_token(&token).await?;

    info!(username, "issued access token");

    Ok(Json(TokenResponse {
        access_token: token.token,
        user_id: user.id,
        expires_at: expires,
    }))
}

/// Resolve the caller from the request headers, if any, and store it as a
/// request extension. Requests with a missing, unknown or expired token
/// continue anonymously.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(caller) = resolve_caller(&state, req.headers()).await {
        req.extensions_mut().insert(caller);
    }
    next.run(req).await
}

async fn resolve_caller(state: &AppState, headers: &HeaderMap) -> Option<Caller> {
    if let Some(ref api_key) = state.config.auth.api_key {
        let presented = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok());
        if presented == Some(api_key.as_str()) {
            let user_id = state
                .config
                .auth
                .api_key_user_id
                .as_deref()
                .and_then(|id| Uuid::parse_str(id).ok())
                .unwrap_or(Uuid::nil());
            return Some(Caller {
                user_id,
                admin: true,
                trusted_member: true,
            });
        }
    }

    let token_str = extract_token(headers)?;
    let token = state.db.get_token(token_str).await.ok()?;

    if token.is_expired(chrono::Utc::now()) {
        debug!("expired access token");
        if let Err(e) = state.db.delete_token(&token.token).await {
            warn!("failed to delete expired token: {}", e);
        }
        return None;
    }

    let user = state.db.get_user_by_id(&token.userid).await.ok()?;
    let user_id = match Uuid::parse_str(&user.id) {
        Ok(id) => id,
        Err(_) => {
            warn!(user = %user.id, "user id is not a uuid");
            return None;
        }
    };

    Some(Caller {
        user_id,
        admin: user.admin,
        trusted_member: user.trustedmember,
    })
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .or_else(|| auth_str.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

async fn authorize(policy: Policy, req: Request, next: Next) -> Result<Response, ApiError> {
    policy.check(req.extensions().get::<Caller>())?;
    Ok(next.run(req).await)
}

pub async fn require_authenticated(req: Request, next: Next) -> Result<Response, ApiError> {
    authorize(Policy::Authenticated, req, next).await
}

pub async fn require_trusted_member(req: Request, next: Next) -> Result<Response, ApiError> {
    authorize(Policy::TrustedMember, req, next).await
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    authorize(Policy::Admin, req, next).await
}

/// Optional caller id. Anonymous requests yield `None`.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Uuid>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<Caller>().map(|c| c.user_id)))
    }
}

/// Required caller id. Rejects anonymous requests with 401.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .map(|c| AuthUser(c.user_id))
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn caller(admin: bool, trusted_member: bool) -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            admin,
            trusted_member,
        }
    }

    #[test]
    fn test_policy_check() {
        let member = caller(false, false);
        let trusted = caller(false, true);
        let admin = caller(true, false);

        assert!(matches!(Policy::Authenticated.check(None), Err(ApiError::Unauthorized)));
        assert!(Policy::Authenticated.check(Some(&member)).is_ok());

        assert!(matches!(Policy::TrustedMember.check(Some(&member)), Err(ApiError::Forbidden)));
        assert!(Policy::TrustedMember.check(Some(&trusted)).is_ok());
        assert!(Policy::TrustedMember.check(Some(&admin)).is_ok());

        assert!(matches!(Policy::Admin.check(Some(&trusted)), Err(ApiError::Forbidden)));
        assert!(Policy::Admin.check(Some(&admin)).is_ok());
    }

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_token(&headers), Some("abc123"));

        headers.insert("Authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }
}
