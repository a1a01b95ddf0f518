// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Common utilities to interact with an SQLite database.

use crate::db::{Db, DbError, DbResult, Executor, TxExecutor};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use log::warn;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Executor as _;
use sqlx::{Database, Either, Transaction};
use std::time::Duration;
use time::OffsetDateTime;

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::RowNotFound => DbError::NotFound,
        e if e.to_string().contains("FOREIGN KEY constraint failed") => DbError::NotFound,
        e if e.to_string().contains("UNIQUE constraint failed") => DbError::AlreadyExists,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Opens a connection pool to the database described by `conn_str`.
///
/// Passing `:memory:` yields an in-memory database shared by all connections in the pool, which
/// disappears once the pool is closed.
pub async fn connect(conn_str: &str) -> DbResult<SqliteDb> {
    let pool = SqlitePool::connect(conn_str).await.map_err(map_sqlx_error)?;
    Ok(SqliteDb { pool })
}

/// A generic database executor implementation for SQLite.
#[derive(Debug)]
pub enum SqliteExecutor {
    /// An executor backed by a pool.  Operations issued via this executor aren't guaranteed to
    /// happen on the same connection.
    PoolExec(PoolConnection<Sqlite>),

    /// An executor backed by a transaction.
    TxExec(Transaction<'static, Sqlite>),
}

impl SqliteExecutor {
    /// Commits the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Do not call commit on direct executors"),
            SqliteExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

impl<'c> sqlx::Executor<'c> for &'c mut SqliteExecutor {
    type Database = Sqlite;

    fn fetch_many<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxStream<
        'e,
        Result<Either<<Sqlite as Database>::QueryResult, <Sqlite as Database>::Row>, sqlx::Error>,
    >
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        match self {
            SqliteExecutor::PoolExec(conn) => (&mut **conn).fetch_many(query),
            SqliteExecutor::TxExec(tx) => (&mut **tx).fetch_many(query),
        }
    }

    fn fetch_optional<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxFuture<'e, Result<Option<<Sqlite as Database>::Row>, sqlx::Error>>
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        match self {
            SqliteExecutor::PoolExec(conn) => (&mut **conn).fetch_optional(query),
            SqliteExecutor::TxExec(tx) => (&mut **tx).fetch_optional(query),
        }
    }

    fn prepare_with<'e, 'q: 'e>(
        self,
        sql: &'q str,
        parameters: &'e [<Sqlite as Database>::TypeInfo],
    ) -> BoxFuture<'e, Result<<Sqlite as Database>::Statement<'q>, sqlx::Error>>
    where
        'c: 'e,
    {
        match self {
            SqliteExecutor::PoolExec(conn) => (&mut **conn).prepare_with(sql, parameters),
            SqliteExecutor::TxExec(tx) => (&mut **tx).prepare_with(sql, parameters),
        }
    }

    fn describe<'e, 'q: 'e>(
        self,
        sql: &'q str,
    ) -> BoxFuture<'e, Result<sqlx::Describe<Self::Database>, sqlx::Error>>
    where
        'c: 'e,
    {
        match self {
            SqliteExecutor::PoolExec(conn) => (&mut **conn).describe(sql),
            SqliteExecutor::TxExec(tx) => (&mut **tx).describe(sql),
        }
    }
}

/// A database instance backed by an SQLite database.
pub struct SqliteDb {
    /// Shared SQLite connection pool.  This is a cloneable type that all concurrent
    /// transactions can use concurrently.
    pool: SqlitePool,
}

impl SqliteDb {
    /// Returns an executor of the specific type used by this database.
    pub async fn typed_ex(&self) -> DbResult<SqliteExecutor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(SqliteExecutor::PoolExec(conn))
    }
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("Dropping connection without having called close() first");
        }
    }
}

#[async_trait]
impl Db for SqliteDb {
    async fn ex(&self) -> DbResult<Executor> {
        Ok(Executor::Sqlite(self.typed_ex().await?))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Sqlite(SqliteExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Helper function to initialize the database with a schema.
///
/// The `schema` may contain multiple statements separated by semicolons.
pub async fn run_schema(e: &mut SqliteExecutor, schema: &str) -> DbResult<()> {
    sqlx::raw_sql(schema).execute(e).await.map_err(map_sqlx_error)?;
    Ok(())
}

/// Converts a duration as extracted from the database into a `Duration`.
///
/// The input parameters must both be positive.  Their types are `i64`s because SQLite only offers
/// signed integers, and storing negative representations would break comparisons in queries.
pub fn build_duration(duration_sec: i64, duration_nsec: i64) -> DbResult<Duration> {
    match (u64::try_from(duration_sec), u64::try_from(duration_nsec)) {
        (Ok(sec), Ok(nsec)) => Ok(Duration::from_secs(sec) + Duration::from_nanos(nsec)),
        _ => Err(DbError::DataIntegrityError(format!(
            "Duration cannot have negative quantities: sec={}, nsec={}",
            duration_sec, duration_nsec
        ))),
    }
}

/// Converts a timestamp as extracted from the database into an `OffsetDateTime`.
///
/// The input parameters must both be positive for the same reasons described in
/// `build_duration`.
pub fn build_timestamp(timestamp_sec: i64, timestamp_nsec: i64) -> DbResult<OffsetDateTime> {
    if timestamp_sec < 0 || timestamp_nsec < 0 {
        return Err(DbError::DataIntegrityError(format!(
            "Timestamp cannot have negative quantities: sec={}, nsec={}",
            timestamp_sec, timestamp_nsec
        )));
    }

    OffsetDateTime::from_unix_timestamp_nanos(
        (i128::from(timestamp_sec) * 1_000_000_000) + (i128::from(timestamp_nsec)),
    )
    .map_err(|e| DbError::DataIntegrityError(format!("Invalid timestamp: {}", e)))
}

/// Converts a duration into the seconds and nanoseconds pair needed by the database.
pub fn unpack_duration(d: Duration) -> DbResult<(i64, i64)> {
    let sec = i64::try_from(d.as_secs()).map_err(|_| {
        DbError::DataIntegrityError(format!("Duration {:?} is too large to store", d))
    })?;
    Ok((sec, i64::from(d.subsec_nanos())))
}

/// Converts a timestamp into the seconds and nanoseconds pair needed by the database.
///
/// Timestamps before the Unix epoch cannot be stored because `build_timestamp` would reject them.
pub fn unpack_timestamp(ts: OffsetDateTime) -> DbResult<(i64, i64)> {
    let sec = ts.unix_timestamp();
    if sec < 0 {
        return Err(DbError::DataIntegrityError(format!(
            "Cannot store a timestamp before the epoch: {}",
            ts
        )));
    }
    Ok((sec, i64::from(ts.nanosecond())))
}

/// Test utilities for the SQLite connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Initializes the test database.
    pub async fn setup() -> SqliteDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        connect(":memory:").await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::db::tests::{generate_db_ro_concurrent_tests, generate_db_rw_tests};

    generate_db_ro_concurrent_tests!(Box::new(setup().await));

    generate_db_rw_tests!(Box::new(setup().await));

    #[tokio::test]
    async fn test_run_schema_multiple_statements() {
        let db = setup().await;
        let mut ex = db.typed_ex().await.unwrap();
        run_schema(
            &mut ex,
            "CREATE TABLE a (i INTEGER);
            -- A comment; with a semicolon.
            CREATE TABLE b (i INTEGER);
            INSERT INTO b (i) VALUES (1);",
        )
        .await
        .unwrap();
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM b").fetch_one(&mut ex).await.unwrap();
        assert_eq!(1, count);
        drop(ex);
        db.close().await;
    }

    #[test]
    fn test_build_unpack_duration_zero() {
        let d = Duration::from_secs(0);
        let (secs, nsecs) = unpack_duration(d).unwrap();
        assert_eq!(0, secs);
        assert_eq!(0, nsecs);
        assert_eq!(Ok(d), build_duration(secs, nsecs));
    }

    #[test]
    fn test_build_unpack_duration_nsecs_precision() {
        let d = Duration::from_nanos(1234567899876543215u64);
        let (secs, nsecs) = unpack_duration(d).unwrap();
        assert_eq!(1234567899i64, secs);
        assert_eq!(876543215i64, nsecs);
        assert_eq!(Ok(d), build_duration(secs, nsecs));
    }

    #[test]
    fn test_unpack_duration_too_large() {
        assert!(matches!(
            unpack_duration(Duration::from_secs(u64::MAX)),
            Err(DbError::DataIntegrityError(_))
        ));
    }

    #[test]
    fn test_build_duration_negative() {
        assert!(matches!(build_duration(-1, 0), Err(DbError::DataIntegrityError(_))));
        assert!(matches!(build_duration(0, -1), Err(DbError::DataIntegrityError(_))));
    }

    #[test]
    fn test_build_unpack_timestamp_nsecs_precision() {
        let d = OffsetDateTime::from_unix_timestamp_nanos(1234567899876543215i128).unwrap();
        let (secs, nsecs) = unpack_timestamp(d).unwrap();
        assert_eq!(1234567899i64, secs);
        assert_eq!(876543215i64, nsecs);
        assert_eq!(Ok(d), build_timestamp(secs, nsecs));
    }

    #[test]
    fn test_unpack_timestamp_before_epoch() {
        let d = OffsetDateTime::from_unix_timestamp(-10).unwrap();
        assert!(matches!(unpack_timestamp(d), Err(DbError::DataIntegrityError(_))));
    }

    #[test]
    fn test_build_timestamp_negative() {
        assert!(matches!(build_timestamp(-1, 0), Err(DbError::DataIntegrityError(_))));
        assert!(matches!(build_timestamp(0, -1), Err(DbError::DataIntegrityError(_))));
    }

    #[test]
    fn test_build_timestamp_too_big() {
        build_timestamp(123456789123456789i64, 0).unwrap_err();
    }
}
