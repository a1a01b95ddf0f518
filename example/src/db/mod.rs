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

//! Database abstraction to manipulate notes.

use crate::model::{Note, NoteId};
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbError, DbResult, Executor};
use iii_iv_core::model::Username;
use sqlx::Row;
use time::OffsetDateTime;


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

/// Reconstructs a note from its raw database fields.
fn build_note(
    id: String,
    owner: String,
    text: String,
    updated: OffsetDateTime,
) -> DbResult<Note> {
    let id = NoteId::new(id).map_err(|e| DbError::DataIntegrityError(e.to_string()))?;
    let owner = Username::new(owner).map_err(|e| DbError::DataIntegrityError(e.to_string()))?;
    Note::new(id, owner, text, updated).map_err(|e| DbError::DataIntegrityError(e.to_string()))
}

/// Inserts `note` unless a note with the same identifier already exists.
///
/// Returns true if this call created the note.  The check and the insert happen in a single
/// statement, so at most one of several concurrent callers sees true.
pub(crate) async fn create_note(ex: &mut Executor, note: &Note) -> DbResult<bool> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "INSERT INTO notes (id, owner, text, updated) VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING";
            sqlx::query(query_str)
                .bind(note.id().as_str())
                .bind(note.owner().as_str())
                .bind(note.text())
                .bind(*note.updated())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (updated_sec, updated_nsec) = sqlite::unpack_timestamp(*note.updated())?;

            let query_str = "
                INSERT INTO notes (id, owner, text, updated_sec, updated_nsec)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (id) DO NOTHING";
            sqlx::query(query_str)
                .bind(note.id().as_str())
                .bind(note.owner().as_str())
                .bind(note.text())
                .bind(updated_sec)
                .bind(updated_nsec)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(DbError::BackendError(format!("Insert affected {} rows", n))),
    }
}

/// Replaces the `text` of the existing note `id` and marks it as updated at `updated`.  The
/// owner never changes.
pub(crate) async fn update_note_text(
    ex: &mut Executor,
    id: &NoteId,
    text: &str,
    updated: OffsetDateTime,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "UPDATE notes SET text = $1, updated = $2 WHERE id = $3";
            sqlx::query(query_str)
                .bind(text)
                .bind(updated)
                .bind(id.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (updated_sec, updated_nsec) = sqlite::unpack_timestamp(updated)?;

            let query_str =
                "UPDATE notes SET text = ?, updated_sec = ?, updated_nsec = ? WHERE id = ?";
            sqlx::query(query_str)
                .bind(text)
                .bind(updated_sec)
                .bind(updated_nsec)
                .bind(id.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Update affected {} rows", n))),
    }
}

/// Gets the note identified by `id`.
pub(crate) async fn get_note(ex: &mut Executor, id: &NoteId) -> DbResult<Note> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT owner, text, updated FROM notes WHERE id = $1";
            let row = sqlx::query(query_str)
                .bind(id.as_str())
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            let owner: String = row.try_get("owner").map_err(postgres::map_sqlx_error)?;
            let text: String = row.try_get("text").map_err(postgres::map_sqlx_error)?;
            let updated: OffsetDateTime =
                row.try_get("updated").map_err(postgres::map_sqlx_error)?;
            build_note(id.as_str().to_owned(), owner, text, updated)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str =
                "SELECT owner, text, updated_sec, updated_nsec FROM notes WHERE id = ?";
            let row = sqlx::query(query_str)
                .bind(id.as_str())
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            let owner: String = row.try_get("owner").map_err(sqlite::map_sqlx_error)?;
            let text: String = row.try_get("text").map_err(sqlite::map_sqlx_error)?;
            let updated_sec: i64 = row.try_get("updated_sec").map_err(sqlite::map_sqlx_error)?;
            let updated_nsec: i64 =
                row.try_get("updated_nsec").map_err(sqlite::map_sqlx_error)?;
            let updated = sqlite::build_timestamp(updated_sec, updated_nsec)?;
            build_note(id.as_str().to_owned(), owner, text, updated)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Deletes the note identified by `id`.
pub(crate) async fn delete_note(ex: &mut Executor, id: &NoteId) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id.as_str())
            .execute(ex)
            .await
            .map_err(postgres::map_sqlx_error)?
            .rows_affected(),

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id.as_str())
            .execute(ex)
            .await
            .map_err(sqlite::map_sqlx_error)?
            .rows_affected(),

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Delete affected {} rows", n))),
    }
}
