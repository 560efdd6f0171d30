use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rentora_core::{Actor, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// Raw role names as the identity provider spells them.
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

impl Claims {
    pub fn new(sub: impl Into<String>, roles: &[&str], ttl: Duration) -> Self {
        Self {
            sub: sub.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        }
    }

    pub fn sign(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes()))
    }

    /// Unknown role names are dropped; a token never grants the internal
    /// `System` role. Every authenticated caller is at least a member.
    pub fn actor(&self) -> Actor {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter_map(|raw| Role::from_claim(raw))
            .filter(|role| *role != Role::System)
            .collect();
        if !roles.contains(&Role::Member) {
            roles.push(Role::Member);
        }
        roles.dedup();
        Actor::new(self.sub.clone(), roles)
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Verifies the bearer token and injects the caller as an [`Actor`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

    req.extensions_mut().insert(token_data.claims.actor());

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_normalizes_roles() {
        let claims = Claims::new("user-7", &["isAdmin", "bogus"], Duration::minutes(5));
        let actor = claims.actor();
        assert_eq!(actor.id, "user-7");
        assert!(actor.is_admin());
        assert!(actor.has_role(Role::Member));
    }

    #[test]
    fn test_token_cannot_claim_system() {
        let claims = Claims::new("mallory", &["system"], Duration::minutes(5));
        let actor = claims.actor();
        assert!(!actor.has_role(Role::System));
        assert_eq!(actor.roles, vec![Role::Member]);
    }

    #[test]
    fn test_signed_token_decodes() {
        let token = Claims::new("renter-1", &["renter"], Duration::minutes(5))
            .sign("secret")
            .unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "renter-1");
    }
}
