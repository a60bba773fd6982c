//! Authentication service.
//!
//! Password authentication (argon2) for users and admins, plus bearer
//! tokens. Users also get a cookie session; admins only ever use tokens.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{Claims, TokenRole};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::SecretString;
use sqlx::PgPool;
use tracing::{info, instrument};

use reality_cheque_core::{Email, Tier};

use crate::db::admins::AdminRepository;
use crate::db::users::{NewUser, UserRepository};
use crate::db::RepositoryError;
use crate::models::{Admin, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Allowed username length, in characters.
const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=50;

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub username: &'r str,
    pub email: &'r str,
    pub password: &'r str,
}

/// Authentication service.
///
/// Handles registration, login and token issuance for users and admins.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    admins: AdminRepository<'a>,
    jwt_secret: &'a SecretString,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, jwt_secret: &'a SecretString) -> Self {
        Self {
            users: UserRepository::new(pool),
            admins: AdminRepository::new(pool),
            jwt_secret,
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Register a new user on the lowest tier with its starting allowance.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername`, `AuthError::InvalidEmail` or
    /// `AuthError::WeakPassword` for bad input.
    /// Returns `AuthError::UserAlreadyExists` if the username or email is taken.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration<'_>) -> Result<User, AuthError> {
        let username = validate_username(registration.username)?;
        let email = Email::parse(registration.email)?;
        validate_password(registration.password)?;

        if self.users.exists(&username, &email).await? {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(registration.password)?;
        let tier = Tier::default();
        let user = self
            .users
            .create(&NewUser {
                username,
                email,
                password_hash,
                tier,
                total_credits: tier.credit_allowance(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email or username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the account or password is wrong.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let (user, password_hash) = self
            .users
            .find_for_login(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;
        Ok(user)
    }

    /// Issue a bearer token for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if encoding fails.
    pub fn user_token(&self, user: &User) -> Result<String, AuthError> {
        token::issue(self.jwt_secret, user.id.as_i32(), TokenRole::User)
    }

    // =========================================================================
    // Admins
    // =========================================================================

    /// Login an admin and issue a short-lived admin token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the account or password is wrong.
    #[instrument(skip(self, password))]
    pub async fn admin_login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(Admin, String), AuthError> {
        let (admin, password_hash) = self
            .admins
            .find_for_login(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;
        self.admins.touch_login(admin.id).await?;

        let token = token::issue(self.jwt_secret, admin.id.as_i32(), TokenRole::Admin)?;
        info!(admin_id = %admin.id, "Admin logged in");
        Ok((admin, token))
    }

    /// Issue a fresh admin token for an admin holding a valid one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the admin no longer exists.
    pub async fn refresh_admin(&self, admin: &Admin) -> Result<String, AuthError> {
        self.admins
            .get_by_id(admin.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        token::issue(self.jwt_secret, admin.id.as_i32(), TokenRole::Admin)
    }

    /// Create an admin account.
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad input and
    /// `AuthError::UserAlreadyExists` if the username or email is taken.
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Admin, AuthError> {
        let username = validate_username(username)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.admins
            .create(&username, &email, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Verify a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token does not verify.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        token::verify(self.jwt_secret, token)
    }
}

/// Validate and trim a username: 3-50 characters of `[A-Za-z0-9_]`.
///
/// # Errors
///
/// Returns `AuthError::InvalidUsername` describing the problem.
pub fn validate_username(username: &str) -> Result<String, AuthError> {
    let username = username.trim();
    let len = username.chars().count();
    if !USERNAME_LENGTH.contains(&len) {
        return Err(AuthError::InvalidUsername(format!(
            "username must be {}-{} characters",
            USERNAME_LENGTH.start(),
            USERNAME_LENGTH.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::InvalidUsername(
            "username may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  agency_42 ").expect("valid"), "agency_42");
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username(&"a".repeat(50)).is_ok());
        assert!(matches!(
            validate_username("bad name"),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(validate_username("dash-name").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
