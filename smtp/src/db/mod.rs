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

//! Database abstraction to track email submissions.
//!
//! Every message handed to the driver is recorded in the `email_log` table before delivery so
//! that daily quotas can be enforced across concurrent senders.

#[cfg(test)]
use futures::TryStreamExt;
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbResult, Executor, count_as_usize, ensure_one_upsert};
use lettre::Message;
use sqlx::Row;
use time::{Date, OffsetDateTime};


/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Counts how many emails were recorded on `day`, in UTC.
pub(crate) async fn count_email_log(ex: &mut Executor, day: Date) -> DbResult<usize> {
    let from = day.midnight().assume_utc();
    let to = from + time::Duration::DAY;

    let total: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "SELECT COUNT(*) AS total FROM email_log WHERE sent >= $1 AND sent < $2";
            let row = sqlx::query(query_str)
                .bind(from)
                .bind(to)
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("total").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            // Day boundaries have no sub-second component so comparing seconds is enough.
            let (from_sec, _) = sqlite::unpack_timestamp(from)?;
            let (to_sec, _) = sqlite::unpack_timestamp(to)?;

            let query_str =
                "SELECT COUNT(*) AS total FROM email_log WHERE sent_sec >= ? AND sent_sec < ?";
            let row = sqlx::query(query_str)
                .bind(from_sec)
                .bind(to_sec)
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("total").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    count_as_usize(total)
}

/// An entry in the email log: submission time, raw message and delivery result.
#[cfg(test)]
pub(crate) type EmailLogEntry = (OffsetDateTime, Vec<u8>, Option<String>);

/// Gets all entries in the email log in insertion order.
#[cfg(test)]
pub(crate) async fn get_email_log(ex: &mut Executor) -> DbResult<Vec<EmailLogEntry>> {
    let mut entries = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT sent, message, result FROM email_log ORDER BY id";
            let mut rows = sqlx::query(query_str).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(postgres::map_sqlx_error)? {
                let sent: OffsetDateTime = row.try_get("sent").map_err(postgres::map_sqlx_error)?;
                let message: Vec<u8> = row.try_get("message").map_err(postgres::map_sqlx_error)?;
                let result: Option<String> =
                    row.try_get("result").map_err(postgres::map_sqlx_error)?;
                entries.push((sent, message, result));
            }
        }

        Executor::Sqlite(ex) => {
            let query_str =
                "SELECT sent_sec, sent_nsec, message, result FROM email_log ORDER BY id";
            let mut rows = sqlx::query(query_str).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(sqlite::map_sqlx_error)? {
                let sent_sec: i64 = row.try_get("sent_sec").map_err(sqlite::map_sqlx_error)?;
                let sent_nsec: i64 = row.try_get("sent_nsec").map_err(sqlite::map_sqlx_error)?;
                let message: Vec<u8> = row.try_get("message").map_err(sqlite::map_sqlx_error)?;
                let result: Option<String> =
                    row.try_get("result").map_err(sqlite::map_sqlx_error)?;
                entries.push((sqlite::build_timestamp(sent_sec, sent_nsec)?, message, result));
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(entries)
}

/// Records that `message` was submitted at time `now` and returns the identifier of the entry.
pub(crate) async fn put_email_log(
    ex: &mut Executor,
    message: &Message,
    now: OffsetDateTime,
) -> DbResult<i64> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "INSERT INTO email_log (sent, message) VALUES ($1, $2) RETURNING id";
            let row = sqlx::query(query_str)
                .bind(now)
                .bind(message.formatted())
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            let id: i32 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
            Ok(i64::from(id))
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_sec, now_nsec) = sqlite::unpack_timestamp(now)?;

            let query_str = "INSERT INTO email_log (sent_sec, sent_nsec, message) VALUES (?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(message.formatted())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Ok(done.last_insert_rowid())
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Records the delivery `result` of the email log entry `id`.
pub(crate) async fn update_email_log(ex: &mut Executor, id: i64, result: &str) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let id = i32::try_from(id).map_err(|e| {
                iii_iv_core::db::DbError::BackendError(format!("Invalid email log id: {}", e))
            })?;
            sqlx::query("UPDATE email_log SET result = $1 WHERE id = $2")
                .bind(result)
                .bind(id)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlx::query("UPDATE email_log SET result = ? WHERE id = ?")
            .bind(result)
            .bind(id)
            .execute(ex)
            .await
            .map_err(sqlite::map_sqlx_error)?
            .rows_affected(),

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_one_upsert(rows_affected)
}
