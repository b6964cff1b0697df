pub mod jwt;
pub mod password;
pub mod permissions;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, services::Actor, state::AppState};

use self::jwt::Claims;
use self::permissions::{is_allowed, Role, ServicePermission};

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_super_admin: bool,
    pub permissions: Vec<ServicePermission>,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        let role: Role = claims.role.parse().map_err(|_| AppError::unauthorized())?;
        let permissions = claims
            .permissions
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        Ok(Self {
            user_id: claims.sub,
            organization_id: claims.org,
            username: claims.username,
            role,
            is_super_admin: claims.super_admin,
            permissions,
        })
    }

    pub fn actor(&self) -> Actor {
        Actor {
            organization_id: self.organization_id,
            user_id: self.user_id,
        }
    }

    /// Fills the caller fields of a span opened by `routes::request_span`.
    pub fn record_on(&self, span: &tracing::Span) {
        span.record("user_id", tracing::field::display(self.user_id));
        span.record("organization_id", tracing::field::display(self.organization_id));
    }

    pub fn can(&self, permission: ServicePermission) -> bool {
        is_allowed(self.role, self.is_super_admin, &self.permissions, permission)
    }

    /// Returns the caller as an [`Actor`] or a 403 naming the missing permission.
    pub fn require(&self, permission: ServicePermission) -> Result<Actor, AppError> {
        if self.can(permission) {
            return Ok(self.actor());
        }
        tracing::warn!(
            user_id = %self.user_id,
            organization_id = %self.organization_id,
            permission = %permission,
            "permission denied"
        );
        Err(AppError::forbidden(format!(
            "Insufficient permissions. Required: {permission}"
        )))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        let user = AuthenticatedUser::from_claims(claims)?;
        user.record_on(&tracing::Span::current());
        Ok(user)
    }
}
