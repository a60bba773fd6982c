//! User repository: accounts, profiles and credit balances.
//!
//! Credit mutations are single SQL statements so concurrent requests for the
//! same user never lose an update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use reality_cheque_core::{Email, Tier, UserId};

use super::RepositoryError;
use crate::models::{Gig, User, UserProfile};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    email: String,
    tier: Tier,
    total_credits: Decimal,
    used_credits: Decimal,
    agency_name: Option<String>,
    services: Option<String>,
    pricing_packages: Option<String>,
    offers: Option<String>,
    case_studies: Option<String>,
    lead_sources: Option<String>,
    gigs: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let gigs: Vec<Gig> = serde_json::from_value(row.gigs)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid gigs JSON: {e}")))?;

        Ok(Self {
            id: UserId::new(row.id),
            username: row.username,
            email,
            tier: row.tier,
            total_credits: row.total_credits,
            used_credits: row.used_credits,
            profile: UserProfile {
                agency_name: row.agency_name,
                services: row.services,
                pricing_packages: row.pricing_packages,
                offers: row.offers,
                case_studies: row.case_studies,
                lead_sources: row.lead_sources,
            },
            gigs,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
struct DebitRow {
    charged: Decimal,
    remaining: Decimal,
}

// =============================================================================
// Parameter / Result Types
// =============================================================================

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub tier: Tier,
    pub total_credits: Decimal,
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<Email>,
    pub profile: UserProfile,
    pub gigs: Option<Vec<Gig>>,
}

/// Result of an atomic credit debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    /// Amount actually added to `used_credits`.
    pub charged: Decimal,
    /// Balance after the debit.
    pub remaining: Decimal,
    /// Whether the charge was cut short to avoid overdrawing.
    pub capped: bool,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, email, tier, total_credits, used_credits,
                   agency_name, services, pricing_packages, offers, case_studies,
                   lead_sources, gigs, created_at, updated_at
            FROM app.users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Find a user and their password hash by email or username.
    ///
    /// The identifier is matched case-insensitively against the email and
    /// exactly against the username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn find_for_login(
        &self,
        identifier: &str,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(
            r"
            SELECT id, username, email, tier, total_credits, used_credits,
                   agency_name, services, pricing_packages, offers, case_studies,
                   lead_sources, gigs, created_at, updated_at, password_hash
            FROM app.users
            WHERE email = LOWER($1) OR username = $1
            LIMIT 1
            ",
        )
        .bind(identifier.trim())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let password_hash = row.password_hash;
        Ok(Some((User::try_from(row.user)?, password_hash)))
    }

    /// Whether a username or email is already registered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn exists(&self, username: &str, email: &Email) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM app.users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username or email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO app.users (username, email, password_hash, tier, total_credits)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, tier, total_credits, used_credits,
                      agency_name, services, pricing_packages, offers, case_studies,
                      lead_sources, gigs, created_at, updated_at
            ",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.tier)
        .bind(new_user.total_credits)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "username or email already exists"))?;

        row.try_into()
    }

    /// Apply a partial profile update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Conflict` if the new username or email is taken.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let gigs = update
            .gigs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("unserializable gigs: {e}")))?;

        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE app.users SET
                username         = COALESCE($2, username),
                email            = COALESCE($3, email),
                agency_name      = COALESCE($4, agency_name),
                services         = COALESCE($5, services),
                pricing_packages = COALESCE($6, pricing_packages),
                offers           = COALESCE($7, offers),
                case_studies     = COALESCE($8, case_studies),
                lead_sources     = COALESCE($9, lead_sources),
                gigs             = COALESCE($10, gigs),
                updated_at       = NOW()
            WHERE id = $1
            RETURNING id, username, email, tier, total_credits, used_credits,
                      agency_name, services, pricing_packages, offers, case_studies,
                      lead_sources, gigs, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(update.username.as_deref())
        .bind(update.email.as_ref())
        .bind(update.profile.agency_name.as_deref())
        .bind(update.profile.services.as_deref())
        .bind(update.profile.pricing_packages.as_deref())
        .bind(update.profile.offers.as_deref())
        .bind(update.profile.case_studies.as_deref())
        .bind(update.profile.lead_sources.as_deref())
        .bind(gigs)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "username or email already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Move a user to another tier on `conn`.
    ///
    /// Takes a connection so plan changes can commit the tier together with
    /// the voucher redemption and allowance grant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_tier(
        conn: &mut PgConnection,
        id: UserId,
        tier: Tier,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE app.users SET tier = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, username, email, tier, total_credits, used_credits,
                      agency_name, services, pricing_packages, offers, case_studies,
                      lead_sources, gigs, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(tier)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Charge `cost` dollars against a user's balance.
    ///
    /// `used_credits` never exceeds `total_credits`: when the balance cannot
    /// cover the full cost, the remainder is charged and `capped` is set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(user_id = %id, cost = %cost))]
    pub async fn debit(&self, id: UserId, cost: Decimal) -> Result<Debit, RepositoryError> {
        let row = sqlx::query_as::<_, DebitRow>(
            r"
            WITH current AS (
                SELECT id, used_credits AS before
                FROM app.users
                WHERE id = $1
                FOR UPDATE
            )
            UPDATE app.users u
            SET used_credits = LEAST(u.total_credits, u.used_credits + $2),
                updated_at = NOW()
            FROM current c
            WHERE u.id = c.id
            RETURNING u.used_credits - c.before AS charged,
                      u.total_credits - u.used_credits AS remaining
            ",
        )
        .bind(id)
        .bind(cost)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(Debit {
            charged: row.charged,
            remaining: row.remaining,
            capped: row.charged < cost,
        })
    }

    /// Add `amount` dollars to a user's total credits. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn grant(&self, id: UserId, amount: Decimal) -> Result<Decimal, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::grant_on(&mut conn, id, amount).await
    }

    /// [`grant`](Self::grant) on a caller-owned connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(conn), fields(user_id = %id, amount = %amount))]
    pub async fn grant_on(
        conn: &mut PgConnection,
        id: UserId,
        amount: Decimal,
    ) -> Result<Decimal, RepositoryError> {
        let remaining: Option<Decimal> = sqlx::query_scalar(
            r"
            UPDATE app.users
            SET total_credits = total_credits + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING total_credits - used_credits
            ",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        remaining.ok_or(RepositoryError::NotFound)
    }

    /// Delete an account. Its chats are deactivated first and kept.
    ///
    /// Returns `false` if the user did not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE app.chats SET is_active = FALSE WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM app.users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// List users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, email, tier, total_credits, used_credits,
                   agency_name, services, pricing_packages, offers, case_studies,
                   lead_sources, gigs, created_at, updated_at
            FROM app.users
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Total number of users.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app.users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
