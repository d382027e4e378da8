//! Stateless bearer tokens. A token embeds the user id, username and role;
//! requests are authorized from these claims without a server-side session.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, AppResult},
    models::UserRole,
};

/// Token lifetime: 24 hours.
const TOKEN_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub:      i64,
    pub username: String,
    pub role:     UserRole,
    pub iat:      i64,
    pub exp:      i64,
}

impl Claims {
    pub fn new(user_id: i64, username: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            username,
            role,
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_HOURS)).timestamp(),
        }
    }
}

pub fn issue(secret: &str, claims: &Claims) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Token signing failed: {e}")))
}

/// Validates signature and expiry. Malformed, tampered and expired tokens all
/// come back as `Unauthorized`.
pub fn verify(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issue_then_verify_round_trip() {
        let claims = Claims::new(42, "sara".into(), UserRole::Student);
        let token  = issue(SECRET, &claims).unwrap();

        let decoded = verify(SECRET, &token).unwrap();
        assert_eq!(decoded.sub, 42);
        assert_eq!(decoded.username, "sara");
        assert_eq!(decoded.role, UserRole::Student);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new(1, "admin".into(), UserRole::Admin);
        let token  = issue(SECRET, &claims).unwrap();
        assert!(verify("other-secret", &token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify(SECRET, "not.a.token").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(1, "admin".into(), UserRole::Admin);
        // Well past the default validation leeway.
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = issue(SECRET, &claims).unwrap();
        assert!(verify(SECRET, &token).is_err());
    }
}
