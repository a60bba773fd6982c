//! Bearer tokens (HS256 JWT).

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Lifetime of a user token.
pub const USER_TOKEN_TTL: Duration = Duration::days(7);

/// Lifetime of an admin token.
pub const ADMIN_TOKEN_TTL: Duration = Duration::minutes(30);

/// Principal kind a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    User,
    Admin,
}

impl TokenRole {
    const fn ttl(self) -> Duration {
        match self {
            Self::User => USER_TOKEN_TTL,
            Self::Admin => ADMIN_TOKEN_TTL,
        }
    }
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User or admin ID, depending on `role`.
    pub sub: i32,
    pub role: TokenRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a token for `sub` with the lifetime of `role`.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` if encoding fails.
pub fn issue(secret: &SecretString, sub: i32, role: TokenRole) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub,
        role,
        iat: now.timestamp(),
        exp: (now + role.ttl()).timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )?;
    Ok(token)
}

/// Verify signature and expiry and return the claims.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` if the token is malformed, expired or
/// signed with another key.
pub fn verify(secret: &SecretString, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("k8#Qz!v2Lp@9Rw$eX4nT7uY1bM5cF3hJ".to_string())
    }

    #[test]
    fn test_issue_and_verify() {
        let token = issue(&secret(), 42, TokenRole::User).expect("issue");
        let claims = verify(&secret(), &token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, TokenRole::User);
        assert_eq!(claims.exp - claims.iat, USER_TOKEN_TTL.num_seconds());
    }

    #[test]
    fn test_admin_token_lifetime() {
        let token = issue(&secret(), 1, TokenRole::Admin).expect("issue");
        let claims = verify(&secret(), &token).expect("verify");
        assert_eq!(claims.role, TokenRole::Admin);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue(&secret(), 1, TokenRole::User).expect("issue");
        let other = SecretString::from("a-completely-different-signing-key-123".to_string());
        assert!(matches!(verify(&other, &token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 1,
            role: TokenRole::User,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret().expose_secret().as_bytes()),
        )
        .expect("encode");
        assert!(verify(&secret(), &token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verify(&secret(), "not.a.jwt").is_err());
    }
}
