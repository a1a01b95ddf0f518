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

//! Database abstraction to manipulate tags.

use futures::TryStreamExt;
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbError, DbResult, Executor};
use sqlx::Row;

#[cfg(test)]
mod tests;

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

/// Attaches `tag` to `entity_id` unless already attached.
pub(crate) async fn put_tag(ex: &mut Executor, tag: &str, entity_id: &str) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "INSERT INTO tags (tag, entity_id) VALUES ($1, $2)
                ON CONFLICT (tag, entity_id) DO NOTHING";
            sqlx::query(query_str)
                .bind(tag)
                .bind(entity_id)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "INSERT INTO tags (tag, entity_id) VALUES (?, ?)
                ON CONFLICT (tag, entity_id) DO NOTHING";
            sqlx::query(query_str)
                .bind(tag)
                .bind(entity_id)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    if rows_affected > 1 {
        return Err(DbError::BackendError(format!("Insert affected {} rows", rows_affected)));
    }
    Ok(())
}

/// Detaches `tag` from `entity_id`.  Returns whether the tag was attached.
pub(crate) async fn delete_tag(ex: &mut Executor, tag: &str, entity_id: &str) -> DbResult<bool> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => sqlx::query("DELETE FROM tags WHERE tag = $1 AND entity_id = $2")
            .bind(tag)
            .bind(entity_id)
            .execute(ex)
            .await
            .map_err(postgres::map_sqlx_error)?
            .rows_affected(),

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlx::query("DELETE FROM tags WHERE tag = ? AND entity_id = ?")
            .bind(tag)
            .bind(entity_id)
            .execute(ex)
            .await
            .map_err(sqlite::map_sqlx_error)?
            .rows_affected(),

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(DbError::BackendError(format!("Delete affected {} rows", n))),
    }
}

/// Runs a query that returns a single `column` of strings, sorted by the query itself, with
/// `arg` as its only parameter.  `queries` holds the same query written for PostgreSQL and for
/// SQLite, in that order.
async fn query_strings(
    ex: &mut Executor,
    queries: (&'static str, &'static str),
    column: &'static str,
    arg: &str,
) -> DbResult<Vec<String>> {
    let mut values = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let mut rows = sqlx::query(queries.0).bind(arg).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(postgres::map_sqlx_error)? {
                values.push(row.try_get(column).map_err(postgres::map_sqlx_error)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let mut rows = sqlx::query(queries.1).bind(arg).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(sqlite::map_sqlx_error)? {
                values.push(row.try_get(column).map_err(sqlite::map_sqlx_error)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(values)
}

/// Gets the tags attached to `entity_id`, sorted alphabetically.
pub(crate) async fn get_tags_of(ex: &mut Executor, entity_id: &str) -> DbResult<Vec<String>> {
    query_strings(
        ex,
        (
            "SELECT tag FROM tags WHERE entity_id = $1 ORDER BY tag",
            "SELECT tag FROM tags WHERE entity_id = ? ORDER BY tag",
        ),
        "tag",
        entity_id,
    )
    .await
}

/// Gets the entities that carry `tag`, sorted alphabetically.
pub(crate) async fn get_entities_with(ex: &mut Executor, tag: &str) -> DbResult<Vec<String>> {
    query_strings(
        ex,
        (
            "SELECT entity_id FROM tags WHERE tag = $1 ORDER BY entity_id",
            "SELECT entity_id FROM tags WHERE tag = ? ORDER BY entity_id",
        ),
        "entity_id",
        tag,
    )
    .await
}

/// Checks if `tag` is attached to `entity_id`.
pub(crate) async fn has_tag(ex: &mut Executor, tag: &str, entity_id: &str) -> DbResult<bool> {
    let count: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "SELECT COUNT(*) AS count FROM tags WHERE tag = $1 AND entity_id = $2";
            let row = sqlx::query(query_str)
                .bind(tag)
                .bind(entity_id)
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("count").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT COUNT(*) AS count FROM tags WHERE tag = ? AND entity_id = ?";
            let row = sqlx::query(query_str)
                .bind(tag)
                .bind(entity_id)
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("count").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    Ok(count > 0)
}
