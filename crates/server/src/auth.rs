//! Request identity from trusted gateway headers.
//!
//! Authentication happens upstream; the gateway forwards the caller in
//! `x-user-id` and `x-user-role`. A missing or malformed user id rejects
//! the request, an unknown role falls back to `User`.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cistern_core::access::Role;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
        let user_id = Uuid::parse_str(raw_id)
            .map_err(|_| ApiError::Unauthorized("invalid x-user-id header".to_string()))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Role::parse)
            .unwrap_or(Role::User);

        Ok(Self { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gate() {
        let admin = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(admin.require_admin().is_ok());

        let user = Identity {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        assert!(matches!(
            user.require_admin(),
            Err(ApiError::Forbidden(_))
        ));
    }
}
