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

//! REST interface for the notes service.

use crate::driver::Driver;
use crate::model::Note;
use axum::http::Method;
use iii_iv_authn::driver::AuthnDriver;
use iii_iv_core::rest::{RestError, RestResult, Route};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

mod note_delete;
mod note_get;
mod note_put;
mod notes_get;
#[cfg(test)]
mod testutils;

/// Representation of a note in responses.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct NoteResponse {
    /// Identifier of the note.
    pub(crate) id: String,

    /// Owner of the note.
    pub(crate) owner: String,

    /// Contents of the note.
    pub(crate) text: String,

    /// Last modification time of the note, in RFC 3339 format.
    pub(crate) updated: String,

    /// Tags attached to the note by the indexer, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) tags: Option<Vec<String>>,
}

impl NoteResponse {
    /// Builds the response for `note` with optional `tags`.
    fn new(note: Note, tags: Option<Vec<String>>) -> RestResult<Self> {
        let updated = note
            .updated()
            .format(&Rfc3339)
            .map_err(|e| RestError::InternalError(format!("Cannot format timestamp: {}", e)))?;
        Ok(Self {
            id: note.id().to_string(),
            owner: note.owner().to_string(),
            text: note.text().clone(),
            updated,
            tags,
        })
    }
}

/// Creates the routes for the notes API mounted under `prefix`, which should not have a
/// trailing slash.  Requests are authenticated against the sessions held by `authn`.
pub(crate) fn api_routes(
    driver: Driver,
    authn: AuthnDriver,
    prefix: &str,
) -> Result<Vec<Route>, String> {
    let state = (driver, authn);
    Ok(vec![
        Route::with_state(
            &format!("{}/notes", prefix),
            &[Method::GET],
            notes_get::handler,
            state.clone(),
        )?,
        Route::with_state(
            &format!("{}/notes/{{id}}", prefix),
            &[Method::GET],
            note_get::handler,
            state.clone(),
        )?,
        Route::with_state(
            &format!("{}/notes/{{id}}", prefix),
            &[Method::PUT],
            note_put::handler,
            state.clone(),
        )?,
        Route::with_state(
            &format!("{}/notes/{{id}}", prefix),
            &[Method::DELETE],
            note_delete::handler,
            state,
        )?,
    ])
}
