use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::AppError;
use crate::services::token::{Claims, TokenService, ROLE_ADMIN, ROLE_MEMBER};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn verified_claims(tokens: &TokenService, headers: &HeaderMap) -> Result<Claims, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    tokens.verify(token).map_err(|_| AppError::Unauthorized)
}

/// Guard for the review workflow endpoints.
pub fn require_admin(tokens: &TokenService, headers: &HeaderMap) -> Result<Claims, AppError> {
    let claims = verified_claims(tokens, headers)?;
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Forbidden("Admin access denied".to_string()));
    }
    Ok(claims)
}

/// Guard for member self-service reads.
pub fn require_member(tokens: &TokenService, headers: &HeaderMap) -> Result<Claims, AppError> {
    let claims = verified_claims(tokens, headers)?;
    if claims.role != ROLE_MEMBER {
        return Err(AppError::Forbidden("Member access denied".to_string()));
    }
    Ok(claims)
}
