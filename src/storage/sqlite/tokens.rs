//! Token persistence and atomic issuance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{decode_ts, encode_ts, stored_precision, SqliteStore};
use crate::ledger::{apply_consume, AccountSeed, ConsumeOutcome};
use crate::model::{
    AccountId, ImagePair, RecipientMeta, Token, TokenId, TokenState, TokenStatus,
};
use crate::storage::schema::Tokens;
use crate::storage::{
    AtomicIssuance, Issuance, Result, StorageError, TokenStore, Transition,
};
use crate::tier::TierPolicy;

const TOKEN_COLUMNS: [Tokens; 7] = [
    Tokens::TokenId,
    Tokens::OwnerAccountId,
    Tokens::Status,
    Tokens::Recipient,
    Tokens::Images,
    Tokens::CreatedAt,
    Tokens::RedeemedAt,
];

impl SqliteStore {
    async fn load_token(conn: &mut SqliteConnection, token_id: &TokenId) -> Result<Option<Token>> {
        let (sql, values) = Query::select()
            .columns(TOKEN_COLUMNS)
            .from(Tokens::Table)
            .and_where(Expr::col(Tokens::TokenId).eq(token_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn insert_token(conn: &mut SqliteConnection, token: &Token) -> Result<()> {
        let recipient = serde_json::to_string(&token.recipient)?;
        let (sql, values) = Query::insert()
            .into_table(Tokens::Table)
            .columns([
                Tokens::TokenId,
                Tokens::OwnerAccountId,
                Tokens::Status,
                Tokens::Recipient,
                Tokens::CreatedAt,
            ])
            .values_panic([
                token.token_id.to_string().into(),
                token.owner.as_str().into(),
                token.status().as_str().into(),
                recipient.into(),
                encode_ts(token.created_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *conn).await?;
        Ok(())
    }
}

fn token_from_row(row: &SqliteRow) -> Result<Token> {
    let token_id = TokenId::from_uuid(Uuid::parse_str(&row.try_get::<String, _>("token_id")?)?);
    let status: TokenStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(StorageError::InvalidRecord)?;
    let recipient: RecipientMeta = serde_json::from_str(&row.try_get::<String, _>("recipient")?)?;
    let images: Option<String> = row.try_get("images")?;
    let redeemed_at: Option<String> = row.try_get("redeemed_at")?;

    let state = match (status, images, redeemed_at) {
        (TokenStatus::Unused, None, _) => TokenState::Unused,
        (TokenStatus::Used, Some(images), Some(redeemed_at)) => TokenState::Used {
            images: serde_json::from_str::<ImagePair>(&images)?,
            redeemed_at: decode_ts(&redeemed_at)?,
        },
        (status, _, _) => {
            return Err(StorageError::InvalidRecord(format!(
                "token {} has status {} with inconsistent images",
                token_id, status
            )))
        }
    };

    Ok(Token {
        token_id,
        owner: AccountId::new(row.try_get::<String, _>("owner_account_id")?),
        recipient,
        created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
        state,
    })
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn create(
        &self,
        owner: &AccountId,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
    ) -> Result<Token> {
        let token = Token::issue(owner.clone(), recipient, stored_precision(now));
        let mut conn = self.pool.acquire().await?;
        Self::insert_token(&mut conn, &token).await?;
        Ok(token)
    }

    async fn lookup(&self, token_id: &TokenId) -> Result<Option<Token>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_token(&mut conn, token_id).await
    }

    async fn redeem(
        &self,
        token_id: &TokenId,
        images: ImagePair,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let images = serde_json::to_string(&images)?;
        let mut tx = self.begin().await?;

        let (sql, values) = Query::update()
            .table(Tokens::Table)
            .values([
                (Tokens::Status, TokenStatus::Used.as_str().into()),
                (Tokens::Images, images.into()),
                (Tokens::RedeemedAt, encode_ts(now).into()),
            ])
            .and_where(Expr::col(Tokens::TokenId).eq(token_id.to_string()))
            .and_where(Expr::col(Tokens::Status).eq(TokenStatus::Unused.as_str()))
            .build_sqlx(SqliteQueryBuilder);

        let updated = sqlx::query_with(&sql, values)
            .execute(tx.conn())
            .await?
            .rows_affected();

        let current = Self::load_token(tx.conn(), token_id).await?;
        match (updated, current) {
            (1, Some(token)) => {
                tx.commit().await?;
                Ok(Transition::Applied(token))
            }
            (_, Some(_)) => {
                tx.rollback().await?;
                Ok(Transition::AlreadyUsed)
            }
            (_, None) => {
                tx.rollback().await?;
                Ok(Transition::NotFound)
            }
        }
    }

    async fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Token>> {
        let (sql, values) = Query::select()
            .columns(TOKEN_COLUMNS)
            .from(Tokens::Table)
            .and_where(Expr::col(Tokens::OwnerAccountId).eq(owner.as_str()))
            .order_by(Tokens::CreatedAt, Order::Desc)
            .build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;
        rows.iter().map(token_from_row).collect()
    }
}

#[async_trait]
impl AtomicIssuance for SqliteStore {
    async fn consume_and_create(
        &self,
        seed: &AccountSeed,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<Issuance> {
        let mut tx = self.begin().await?;
        let mut account = Self::load_or_seed(tx.conn(), seed, now).await?;

        let grant = match apply_consume(&mut account, now, policy) {
            ConsumeOutcome::Granted(grant) => grant,
            ConsumeOutcome::Denied(denied) => {
                tx.rollback().await?;
                return Ok(Issuance::Denied(denied));
            }
        };

        let token = Token::issue(seed.account_id.clone(), recipient, stored_precision(now));
        Self::save_account(tx.conn(), &account).await?;
        Self::insert_token(tx.conn(), &token).await?;
        tx.commit().await?;

        Ok(Issuance::Issued { token, grant })
    }
}
