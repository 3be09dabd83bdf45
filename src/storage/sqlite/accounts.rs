//! Account persistence and quota operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{decode_count, decode_ts, encode_ts, stored_precision, SqliteStore};
use crate::ledger::{apply_consume, apply_refund, AccountSeed, ConsumeOutcome};
use crate::model::{Account, AccountId};
use crate::storage::schema::Accounts;
use crate::storage::{AccountStore, Result};
use crate::tier::TierPolicy;

impl SqliteStore {
    pub(super) async fn load_account(
        conn: &mut SqliteConnection,
        account_id: &AccountId,
    ) -> Result<Option<Account>> {
        let (sql, values) = Query::select()
            .columns([
                Accounts::AccountId,
                Accounts::Email,
                Accounts::Tier,
                Accounts::IssuedThisPeriod,
                Accounts::PeriodResetAt,
                Accounts::CreatedAt,
            ])
            .from(Accounts::Table)
            .and_where(Expr::col(Accounts::AccountId).eq(account_id.as_str()))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    /// Write the full record, inserting or replacing the mutable columns.
    pub(super) async fn save_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(Accounts::Table)
            .columns([
                Accounts::AccountId,
                Accounts::Email,
                Accounts::Tier,
                Accounts::IssuedThisPeriod,
                Accounts::PeriodResetAt,
                Accounts::CreatedAt,
            ])
            .values_panic([
                account.account_id.as_str().into(),
                account.email.as_str().into(),
                account.tier.as_str().into(),
                i64::from(account.issued_this_period).into(),
                encode_ts(account.period_reset_at).into(),
                encode_ts(account.created_at).into(),
            ])
            .on_conflict(
                OnConflict::column(Accounts::AccountId)
                    .update_columns([
                        Accounts::Tier,
                        Accounts::IssuedThisPeriod,
                        Accounts::PeriodResetAt,
                    ])
                    .to_owned(),
            )
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *conn).await?;
        Ok(())
    }

    /// Load the account for `seed`, or the record it would be created as.
    pub(super) async fn load_or_seed(
        conn: &mut SqliteConnection,
        seed: &AccountSeed,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        Ok(match Self::load_account(conn, &seed.account_id).await? {
            Some(account) => account,
            None => seed.clone().into_account(stored_precision(now)),
        })
    }
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        account_id: AccountId::new(row.try_get::<String, _>("account_id")?),
        email: row.try_get("email")?,
        tier: row.try_get("tier")?,
        issued_this_period: decode_count(row.try_get("issued_this_period")?)?,
        period_reset_at: decode_ts(&row.try_get::<String, _>("period_reset_at")?)?,
        created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_account(&mut conn, account_id).await
    }

    async fn insert(&self, account: Account) -> Result<bool> {
        let (sql, values) = Query::insert()
            .into_table(Accounts::Table)
            .columns([
                Accounts::AccountId,
                Accounts::Email,
                Accounts::Tier,
                Accounts::IssuedThisPeriod,
                Accounts::PeriodResetAt,
                Accounts::CreatedAt,
            ])
            .values_panic([
                account.account_id.as_str().into(),
                account.email.as_str().into(),
                account.tier.as_str().into(),
                i64::from(account.issued_this_period).into(),
                encode_ts(account.period_reset_at).into(),
                encode_ts(account.created_at).into(),
            ])
            .on_conflict(OnConflict::column(Accounts::AccountId).do_nothing().to_owned())
            .build_sqlx(SqliteQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_tier(&self, account_id: &AccountId, tier: &str) -> Result<Option<Account>> {
        let mut tx = self.begin().await?;
        let Some(mut account) = Self::load_account(tx.conn(), account_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        account.tier = tier.to_string();
        Self::save_account(tx.conn(), &account).await?;
        tx.commit().await?;
        Ok(Some(account))
    }

    async fn consume(
        &self,
        seed: &AccountSeed,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<ConsumeOutcome> {
        let mut tx = self.begin().await?;
        let mut account = Self::load_or_seed(tx.conn(), seed, now).await?;

        let outcome = apply_consume(&mut account, now, policy);
        if outcome.is_granted() {
            Self::save_account(tx.conn(), &account).await?;
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    async fn refund(
        &self,
        account_id: &AccountId,
        period_reset_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.begin().await?;
        let Some(mut account) = Self::load_account(tx.conn(), account_id).await? else {
            tx.rollback().await?;
            return Ok(false);
        };
        if !apply_refund(&mut account, period_reset_at) {
            tx.rollback().await?;
            return Ok(false);
        }
        Self::save_account(tx.conn(), &account).await?;
        tx.commit().await?;
        Ok(true)
    }
}
