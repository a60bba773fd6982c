//! Voucher repository.
//!
//! Redemption is one conditional `UPDATE`: the usage limit, the per-user
//! uniqueness and the validity window are all checked by the statement that
//! records the use.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use reality_cheque_core::{AdminId, UserId, VoucherCode, VoucherId, VoucherType};

use super::RepositoryError;
use crate::models::Voucher;

#[derive(Debug, sqlx::FromRow)]
struct VoucherRow {
    id: i32,
    code: String,
    voucher_type: VoucherType,
    value: Decimal,
    description: Option<String>,
    max_uses: i32,
    used_count: i32,
    used_by: Vec<i32>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    is_active: bool,
    applicable_plans: Vec<String>,
    created_by: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = RepositoryError;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        let code = VoucherCode::parse(&row.code).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid voucher code in database: {e}"))
        })?;

        Ok(Self {
            id: VoucherId::new(row.id),
            code,
            voucher_type: row.voucher_type,
            value: row.value,
            description: row.description,
            max_uses: row.max_uses,
            used_count: row.used_count,
            used_by: row.used_by.into_iter().map(UserId::new).collect(),
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
            applicable_plans: row.applicable_plans,
            created_by: row.created_by.map(AdminId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields for a new voucher, already validated.
#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub code: VoucherCode,
    pub voucher_type: VoucherType,
    pub value: Decimal,
    pub description: Option<String>,
    pub max_uses: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub applicable_plans: Vec<String>,
    pub created_by: Option<AdminId>,
}

/// Repository for voucher database operations.
pub struct VoucherRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VoucherRepository<'a> {
    /// Create a new voucher repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a voucher by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get(&self, id: VoucherId) -> Result<Option<Voucher>, RepositoryError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r"
            SELECT id, code, voucher_type, value, description, max_uses, used_count,
                   used_by, valid_from, valid_until, is_active, applicable_plans,
                   created_by, created_at, updated_at
            FROM app.vouchers
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a voucher by code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_code(&self, code: &VoucherCode) -> Result<Option<Voucher>, RepositoryError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r"
            SELECT id, code, voucher_type, value, description, max_uses, used_count,
                   used_by, valid_from, valid_until, is_active, applicable_plans,
                   created_by, created_at, updated_at
            FROM app.vouchers
            WHERE code = $1
            ",
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Whether a code is already taken.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn code_exists(&self, code: &VoucherCode) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM app.vouchers WHERE code = $1)")
                .bind(code)
                .fetch_one(self.pool)
                .await?;

        Ok(exists)
    }

    /// List all vouchers, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn list(&self) -> Result<Vec<Voucher>, RepositoryError> {
        let rows = sqlx::query_as::<_, VoucherRow>(
            r"
            SELECT id, code, voucher_type, value, description, max_uses, used_count,
                   used_by, valid_from, valid_until, is_active, applicable_plans,
                   created_by, created_at, updated_at
            FROM app.vouchers
            ORDER BY created_at DESC, id DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Create a voucher.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    #[instrument(skip(self, new), fields(code = %new.code))]
    pub async fn create(&self, new: &NewVoucher) -> Result<Voucher, RepositoryError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r"
            INSERT INTO app.vouchers
                (code, voucher_type, value, description, max_uses,
                 valid_from, valid_until, applicable_plans, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, code, voucher_type, value, description, max_uses, used_count,
                      used_by, valid_from, valid_until, is_active, applicable_plans,
                      created_by, created_at, updated_at
            ",
        )
        .bind(&new.code)
        .bind(new.voucher_type)
        .bind(new.value)
        .bind(new.description.as_deref())
        .bind(new.max_uses)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(&new.applicable_plans)
        .bind(new.created_by)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "voucher code already exists"))?;

        row.try_into()
    }

    /// Record one use of `code` by `user_id`.
    ///
    /// Returns `None` when the voucher is inactive, outside its validity
    /// window, exhausted, or already used by this user at the time of the
    /// update. Concurrent calls can never push `used_count` past `max_uses`
    /// or add the same user twice.
    ///
    /// Runs on `conn` so the caller can commit the use together with whatever
    /// the voucher pays out. Rolling back releases the use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(conn), fields(code = %code, user_id = %user_id))]
    pub async fn redeem(
        conn: &mut PgConnection,
        code: &VoucherCode,
        user_id: UserId,
    ) -> Result<Option<Voucher>, RepositoryError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r"
            UPDATE app.vouchers
            SET used_count = used_count + 1,
                used_by = array_append(used_by, $2),
                updated_at = NOW()
            WHERE code = $1
              AND is_active
              AND NOW() >= valid_from
              AND NOW() <= valid_until
              AND used_count < max_uses
              AND NOT ($2 = ANY(used_by))
            RETURNING id, code, voucher_type, value, description, max_uses, used_count,
                      used_by, valid_from, valid_until, is_active, applicable_plans,
                      created_by, created_at, updated_at
            ",
        )
        .bind(code)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Enable or disable a voucher.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the voucher does not exist.
    pub async fn set_active(&self, id: VoucherId, active: bool) -> Result<Voucher, RepositoryError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r"
            UPDATE app.vouchers SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, voucher_type, value, description, max_uses, used_count,
                      used_by, valid_from, valid_until, is_active, applicable_plans,
                      created_by, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a voucher that has never been used.
    ///
    /// Returns `false` if it does not exist or has been used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_unused(&self, id: VoucherId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM app.vouchers WHERE id = $1 AND used_count = 0")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
