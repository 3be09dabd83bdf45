//! Orphaned charge log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::Row;
use uuid::Uuid;

use super::{decode_ts, encode_ts, SqliteStore};
use crate::ledger::apply_refund;
use crate::model::AccountId;
use crate::storage::schema::OrphanedCharges;
use crate::storage::{OrphanedCharge, ReconciliationLog, Result, Settlement};

#[async_trait]
impl ReconciliationLog for SqliteStore {
    async fn record(&self, charge: OrphanedCharge) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(OrphanedCharges::Table)
            .columns([
                OrphanedCharges::ChargeId,
                OrphanedCharges::AccountId,
                OrphanedCharges::PeriodResetAt,
                OrphanedCharges::RecordedAt,
                OrphanedCharges::Reason,
            ])
            .values_panic([
                charge.charge_id.to_string().into(),
                charge.account_id.as_str().into(),
                encode_ts(charge.period_reset_at).into(),
                encode_ts(charge.recorded_at).into(),
                charge.reason.into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.pool).await?;
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<OrphanedCharge>> {
        let (sql, values) = Query::select()
            .columns([
                OrphanedCharges::ChargeId,
                OrphanedCharges::AccountId,
                OrphanedCharges::PeriodResetAt,
                OrphanedCharges::RecordedAt,
                OrphanedCharges::Reason,
            ])
            .from(OrphanedCharges::Table)
            .and_where(Expr::col(OrphanedCharges::ResolvedAt).is_null())
            .order_by(OrphanedCharges::RecordedAt, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

        let mut charges = Vec::with_capacity(rows.len());
        for row in rows {
            charges.push(OrphanedCharge {
                charge_id: Uuid::parse_str(&row.try_get::<String, _>("charge_id")?)?,
                account_id: AccountId::new(row.try_get::<String, _>("account_id")?),
                period_reset_at: decode_ts(&row.try_get::<String, _>("period_reset_at")?)?,
                recorded_at: decode_ts(&row.try_get::<String, _>("recorded_at")?)?,
                reason: row.try_get("reason")?,
            });
        }
        Ok(charges)
    }

    async fn refund_and_resolve(
        &self,
        charge_id: &Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Settlement> {
        let mut tx = self.begin().await?;

        let (sql, values) = Query::select()
            .columns([OrphanedCharges::AccountId, OrphanedCharges::PeriodResetAt])
            .from(OrphanedCharges::Table)
            .and_where(Expr::col(OrphanedCharges::ChargeId).eq(charge_id.to_string()))
            .and_where(Expr::col(OrphanedCharges::ResolvedAt).is_null())
            .build_sqlx(SqliteQueryBuilder);
        let Some(row) = sqlx::query_with(&sql, values)
            .fetch_optional(tx.conn())
            .await?
        else {
            tx.rollback().await?;
            return Ok(Settlement::AlreadyResolved);
        };
        let account_id = AccountId::new(row.try_get::<String, _>("account_id")?);
        let period_reset_at = decode_ts(&row.try_get::<String, _>("period_reset_at")?)?;

        let mut refunded = false;
        if let Some(mut account) = Self::load_account(tx.conn(), &account_id).await? {
            if apply_refund(&mut account, period_reset_at) {
                Self::save_account(tx.conn(), &account).await?;
                refunded = true;
            }
        }

        let (sql, values) = Query::update()
            .table(OrphanedCharges::Table)
            .values([(OrphanedCharges::ResolvedAt, encode_ts(resolved_at).into())])
            .and_where(Expr::col(OrphanedCharges::ChargeId).eq(charge_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(tx.conn()).await?;

        tx.commit().await?;
        Ok(if refunded {
            Settlement::Refunded
        } else {
            Settlement::Dropped
        })
    }
}
