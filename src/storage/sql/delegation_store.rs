//! Unified SQL DelegationStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use super::SqlDatabase;

/// Rows per INSERT statement inside a bulk write transaction.
pub(crate) const INSERT_CHUNK_SIZE: usize = 500;

/// SQL-based implementation of DelegationStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlDelegationStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlDelegationStore<DB> {
    /// Create a new SQL delegation store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

/// Macro to implement DelegationStore for a specific SQL backend.
///
/// This eliminates duplication between PostgreSQL and SQLite implementations
/// while maintaining full type safety.
macro_rules! impl_delegation_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlDelegationStore<$db_type> {
            /// Create the table and indexes if they do not exist.
            pub async fn init(&self) -> crate::storage::Result<()> {
                for stmt in <$db_type as SqlDatabase>::SCHEMA {
                    sqlx::query(stmt).execute(&self.pool).await?;
                }
                tracing::debug!(backend = $feature, "Delegations schema ready");
                Ok(())
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::DelegationStore for SqlDelegationStore<$db_type> {
            async fn bulk_write(
                &self,
                rows: &[crate::storage::NewDelegation],
            ) -> crate::storage::Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::{timestamp_literal, Delegations};

                if rows.is_empty() {
                    return Ok(());
                }

                let mut tx = self.pool.begin().await?;

                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    // The statement is not Send; only the rendered SQL may
                    // live across the await.
                    let sql = {
                        let mut stmt = Query::insert();
                        stmt.into_table(Delegations::Table)
                            .columns([
                                Delegations::TzktId,
                                Delegations::Timestamp,
                                Delegations::Amount,
                                Delegations::Delegator,
                                Delegations::Level,
                                Delegations::Year,
                            ])
                            .on_conflict(
                                OnConflict::column(Delegations::TzktId)
                                    .do_nothing()
                                    .to_owned(),
                            );

                        for row in chunk {
                            stmt.values([
                                row.tzkt_id.into(),
                                timestamp_literal(&row.timestamp).into(),
                                row.amount.into(),
                                row.delegator.as_str().into(),
                                row.level.into(),
                                row.year().into(),
                            ])?;
                        }

                        <$db_type>::build_insert(stmt)
                    };

                    sqlx::query(&sql).execute(&mut *tx).await?;
                }

                tx.commit().await?;
                Ok(())
            }

            async fn watermark(&self) -> crate::storage::Result<crate::storage::Watermark> {
                use chrono::{DateTime, Utc};
                use sea_query::{Alias, Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::Delegations;

                let stmt = Query::select()
                    .expr_as(Expr::col(Delegations::Timestamp).max(), Alias::new("max_timestamp"))
                    .expr_as(Expr::col(Delegations::Level).max(), Alias::new("max_level"))
                    .from(Delegations::Table)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;

                let timestamp: Option<DateTime<Utc>> = row.try_get("max_timestamp")?;
                let level: Option<i64> = row.try_get("max_level")?;

                Ok(match timestamp {
                    Some(timestamp) => crate::storage::Watermark {
                        timestamp,
                        level: level.unwrap_or(0),
                    },
                    None => crate::storage::Watermark::empty(),
                })
            }

            async fn page(
                &self,
                year: Option<i32>,
                limit: u64,
                offset: u64,
            ) -> crate::storage::Result<Vec<crate::storage::Delegation>> {
                use sea_query::{Expr, Order, Query};
                use sqlx::Row;

                use crate::storage::schema::Delegations;

                let stmt = Query::select()
                    .columns([
                        Delegations::Id,
                        Delegations::Timestamp,
                        Delegations::Amount,
                        Delegations::Delegator,
                        Delegations::Level,
                    ])
                    .from(Delegations::Table)
                    .and_where_option(year.map(|year| Expr::col(Delegations::Year).eq(year)))
                    .order_by(Delegations::Timestamp, Order::Desc)
                    .order_by(Delegations::Id, Order::Desc)
                    .limit(limit)
                    .offset(offset)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| -> crate::storage::Result<crate::storage::Delegation> {
                        Ok(crate::storage::Delegation {
                            id: row.try_get("id")?,
                            timestamp: row.try_get("timestamp")?,
                            amount: row.try_get("amount")?,
                            delegator: row.try_get("delegator")?,
                            level: row.try_get("level")?,
                        })
                    })
                    .collect()
            }

            async fn ping(&self) -> crate::storage::Result<()> {
                sqlx::query("SELECT 1").execute(&self.pool).await?;
                Ok(())
            }

            fn open_connections(&self) -> u32 {
                self.pool.size()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_delegation_store!(super::postgres::Postgres, "postgres");
impl_delegation_store!(super::sqlite::Sqlite, "sqlite");
