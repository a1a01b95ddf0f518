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

//! Database abstractions to manipulate queue tasks.

use crate::model::{Task, TaskStatus};
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbError, DbResult, Executor};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Parses the textual `payload` of a task as stored in the database.
fn parse_payload(payload: &str) -> DbResult<serde_json::Value> {
    serde_json::from_str(payload)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid task payload: {}", e)))
}

/// Converts the raw `runs` counter of a task as stored in the database.
fn parse_runs(runs: i16) -> DbResult<u16> {
    u16::try_from(runs)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid runs {}: {}", runs, e)))
}

/// Builds a `Task` from a PostgreSQL row that contains all task columns.
#[cfg(feature = "postgres")]
fn task_from_postgres_row(row: &sqlx::postgres::PgRow) -> DbResult<Task> {
    let id: Uuid = row.try_get("id").map_err(postgres::map_sqlx_error)?;
    let task_type: String = row.try_get("task_type").map_err(postgres::map_sqlx_error)?;
    let payload: String = row.try_get("payload").map_err(postgres::map_sqlx_error)?;
    let status: String = row.try_get("status").map_err(postgres::map_sqlx_error)?;
    let error: Option<String> = row.try_get("error").map_err(postgres::map_sqlx_error)?;
    let result: Option<String> = row.try_get("result").map_err(postgres::map_sqlx_error)?;
    let runs: i16 = row.try_get("runs").map_err(postgres::map_sqlx_error)?;
    let created: OffsetDateTime = row.try_get("created").map_err(postgres::map_sqlx_error)?;
    let updated: OffsetDateTime = row.try_get("updated").map_err(postgres::map_sqlx_error)?;
    let only_after: Option<OffsetDateTime> =
        row.try_get("only_after").map_err(postgres::map_sqlx_error)?;

    Ok(Task {
        id,
        task_type,
        payload: parse_payload(&payload)?,
        status: TaskStatus::from_str(&status)?,
        error,
        result,
        runs: parse_runs(runs)?,
        created,
        updated,
        only_after,
    })
}

/// Builds a `Task` from a SQLite row that contains all task columns.
#[cfg(any(feature = "sqlite", test))]
fn task_from_sqlite_row(row: &sqlx::sqlite::SqliteRow) -> DbResult<Task> {
    let id: Uuid = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
    let task_type: String = row.try_get("task_type").map_err(sqlite::map_sqlx_error)?;
    let payload: String = row.try_get("payload").map_err(sqlite::map_sqlx_error)?;
    let status: String = row.try_get("status").map_err(sqlite::map_sqlx_error)?;
    let error: Option<String> = row.try_get("error").map_err(sqlite::map_sqlx_error)?;
    let result: Option<String> = row.try_get("result").map_err(sqlite::map_sqlx_error)?;
    let runs: i16 = row.try_get("runs").map_err(sqlite::map_sqlx_error)?;
    let created_sec: i64 = row.try_get("created_sec").map_err(sqlite::map_sqlx_error)?;
    let created_nsec: i64 = row.try_get("created_nsec").map_err(sqlite::map_sqlx_error)?;
    let updated_sec: i64 = row.try_get("updated_sec").map_err(sqlite::map_sqlx_error)?;
    let updated_nsec: i64 = row.try_get("updated_nsec").map_err(sqlite::map_sqlx_error)?;
    let only_after_sec: Option<i64> =
        row.try_get("only_after_sec").map_err(sqlite::map_sqlx_error)?;
    let only_after_nsec: Option<i64> =
        row.try_get("only_after_nsec").map_err(sqlite::map_sqlx_error)?;

    let only_after = match (only_after_sec, only_after_nsec) {
        (Some(sec), Some(nsec)) => Some(sqlite::build_timestamp(sec, nsec)?),
        (None, None) => None,
        (_, _) => {
            return Err(DbError::DataIntegrityError(format!(
                "Inconsistent only_after sec ({:?}) and nsec ({:?}) values",
                only_after_sec, only_after_nsec
            )));
        }
    };

    Ok(Task {
        id,
        task_type,
        payload: parse_payload(&payload)?,
        status: TaskStatus::from_str(&status)?,
        error,
        result,
        runs: parse_runs(runs)?,
        created: sqlite::build_timestamp(created_sec, created_nsec)?,
        updated: sqlite::build_timestamp(updated_sec, updated_nsec)?,
        only_after,
    })
}

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

/// Stores a new task of `task_type` described by `payload`, marks it as queued, and tracks that
/// it was enqueued at the `created` timestamp.  The task is postponed until `only_after` if
/// specified.  Returns the ID of the created task.
pub(crate) async fn put_new_task(
    ex: &mut Executor,
    task_type: &str,
    payload: &serde_json::Value,
    created: OffsetDateTime,
    only_after: Option<OffsetDateTime>,
) -> DbResult<Uuid> {
    let id = Uuid::new_v4();
    let payload = payload.to_string();

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO tasks
                    (id, task_type, payload, status, runs, created, updated, only_after)
                VALUES
                    ($1, $2,        $3,      $4,     0,    $5,      $5,      $6)
            ";
            sqlx::query(query_str)
                .bind(id)
                .bind(task_type)
                .bind(&payload)
                .bind(TaskStatus::Queued.as_str())
                .bind(created)
                .bind(only_after)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_sec, created_nsec) = sqlite::unpack_timestamp(created)?;
            let only_after = only_after.map(sqlite::unpack_timestamp).transpose()?;

            let query_str = "
                INSERT INTO tasks
                    (id, task_type, payload, status, runs,
                    created_sec, created_nsec, updated_sec, updated_nsec,
                    only_after_sec, only_after_nsec)
                VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            ";
            sqlx::query(query_str)
                .bind(id)
                .bind(task_type)
                .bind(&payload)
                .bind(TaskStatus::Queued.as_str())
                .bind(created_sec)
                .bind(created_nsec)
                .bind(created_sec)
                .bind(created_nsec)
                .bind(only_after.map(|(sec, _nsec)| sec))
                .bind(only_after.map(|(_sec, nsec)| nsec))
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    if rows_affected != 1 {
        return Err(DbError::BackendError(format!("Insert created {} rows", rows_affected)));
    }
    Ok(id)
}

/// Gets the task with the given `id`.
pub(crate) async fn get_task(ex: &mut Executor, id: Uuid) -> DbResult<Task> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM tasks WHERE id = $1";
            match sqlx::query(query_str)
                .bind(id)
                .fetch_optional(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
            {
                Some(row) => task_from_postgres_row(&row),
                None => Err(DbError::NotFound),
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT * FROM tasks WHERE id = ?";
            match sqlx::query(query_str)
                .bind(id)
                .fetch_optional(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
            {
                Some(row) => task_from_sqlite_row(&row),
                None => Err(DbError::NotFound),
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Claims the oldest runnable task of `task_type` at time `now` and marks it as processing.
///
/// Runnable tasks are those that are queued and not deferred past `now`, plus those that a worker
/// claimed but did not report on for longer than `max_runtime` (lost tasks).  Claiming a task
/// bumps its `runs` counter.  Returns `None` if there is nothing to run.
pub(crate) async fn claim_task(
    ex: &mut Executor,
    task_type: &str,
    max_runtime: Duration,
    now: OffsetDateTime,
) -> DbResult<Option<Task>> {
    let stale = now - max_runtime;

    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE tasks
                SET status = 'PROCESSING', runs = runs + 1, updated = $1
                WHERE id = (
                    SELECT id FROM tasks
                    WHERE task_type = $2 AND (
                        (status = 'QUEUED' AND (only_after IS NULL OR only_after <= $1))
                        OR (status = 'PROCESSING' AND updated < $3)
                    )
                    ORDER BY created ASC
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
            ";
            match sqlx::query(query_str)
                .bind(now)
                .bind(task_type)
                .bind(stale)
                .fetch_optional(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
            {
                Some(row) => Ok(Some(task_from_postgres_row(&row)?)),
                None => Ok(None),
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_sec, now_nsec) = sqlite::unpack_timestamp(now)?;
            let (stale_sec, stale_nsec) = sqlite::unpack_timestamp(stale)?;

            // SQLite serializes writers so the subquery and the update cannot interleave with
            // another claim.
            let query_str = "
                UPDATE tasks
                SET status = 'PROCESSING', runs = runs + 1, updated_sec = ?, updated_nsec = ?
                WHERE id = (
                    SELECT id FROM tasks
                    WHERE task_type = ? AND (
                        (status = 'QUEUED' AND (
                            only_after_sec IS NULL
                            OR only_after_sec < ?
                            OR (only_after_sec = ? AND only_after_nsec <= ?)
                        ))
                        OR (status = 'PROCESSING' AND (
                            updated_sec < ?
                            OR (updated_sec = ? AND updated_nsec < ?)
                        ))
                    )
                    ORDER BY created_sec ASC, created_nsec ASC
                    LIMIT 1
                )
                RETURNING *
            ";
            match sqlx::query(query_str)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(task_type)
                .bind(now_sec)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(stale_sec)
                .bind(stale_sec)
                .bind(stale_nsec)
                .fetch_optional(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
            {
                Some(row) => Ok(Some(task_from_sqlite_row(&row)?)),
                None => Ok(None),
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Validates that an update guarded by the `PROCESSING` status of task `id` touched one row.
///
/// When it did not, figures out whether the task is missing or in the wrong state to return a
/// meaningful error.
async fn ensure_processing_update(ex: &mut Executor, id: Uuid, affected: u64) -> DbResult<()> {
    match affected {
        0 => {
            let task = get_task(ex, id).await?;
            Err(DbError::BackendError(format!(
                "Task {} is not processing (status {})",
                id, task.status
            )))
        }
        1 => Ok(()),
        _ => Err(DbError::BackendError(format!("Update of {} affected {} rows", id, affected))),
    }
}

/// Records the final `status` of the processing task `id` at time `now`, along with its
/// optional `error` and `result` details.
pub(crate) async fn finish_task(
    ex: &mut Executor,
    id: Uuid,
    status: TaskStatus,
    error: Option<&str>,
    result: Option<&str>,
    now: OffsetDateTime,
) -> DbResult<()> {
    if !status.is_done() {
        return Err(DbError::BackendError(format!(
            "Invalid final status {} for task {}",
            status, id
        )));
    }

    let affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE tasks
                SET status = $1, error = $2, result = $3, updated = $4
                WHERE id = $5 AND status = 'PROCESSING'
            ";
            sqlx::query(query_str)
                .bind(status.as_str())
                .bind(error)
                .bind(result)
                .bind(now)
                .bind(id)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_sec, now_nsec) = sqlite::unpack_timestamp(now)?;

            let query_str = "
                UPDATE tasks
                SET status = ?, error = ?, result = ?, updated_sec = ?, updated_nsec = ?
                WHERE id = ? AND status = 'PROCESSING'
            ";
            sqlx::query(query_str)
                .bind(status.as_str())
                .bind(error)
                .bind(result)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(id)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_processing_update(ex, id, affected).await
}

/// Returns the processing task `id` to the queue so that it runs again after `only_after`,
/// recording `error` as the reason for the retry.
pub(crate) async fn requeue_task(
    ex: &mut Executor,
    id: Uuid,
    only_after: OffsetDateTime,
    error: &str,
    now: OffsetDateTime,
) -> DbResult<()> {
    let affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE tasks
                SET status = 'QUEUED', error = $1, only_after = $2, updated = $3
                WHERE id = $4 AND status = 'PROCESSING'
            ";
            sqlx::query(query_str)
                .bind(error)
                .bind(only_after)
                .bind(now)
                .bind(id)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (only_after_sec, only_after_nsec) = sqlite::unpack_timestamp(only_after)?;
            let (now_sec, now_nsec) = sqlite::unpack_timestamp(now)?;

            let query_str = "
                UPDATE tasks
                SET status = 'QUEUED', error = ?, only_after_sec = ?, only_after_nsec = ?,
                    updated_sec = ?, updated_nsec = ?
                WHERE id = ? AND status = 'PROCESSING'
            ";
            sqlx::query(query_str)
                .bind(error)
                .bind(only_after_sec)
                .bind(only_after_nsec)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(id)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_processing_update(ex, id, affected).await
}
