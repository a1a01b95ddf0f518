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

//! API to create or update a note.

use crate::driver::Driver;
use crate::model::NoteId;
use crate::rest::NoteResponse;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use iii_iv_authn::driver::AuthnDriver;
use iii_iv_authn::rest::get_session_user;
use iii_iv_core::rest::{JsonBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to store a note.
#[derive(Deserialize, Serialize)]
pub(crate) struct NoteRequest {
    /// New contents of the note.
    pub(crate) text: String,
}

/// PUT handler for this API.
pub(crate) async fn handler(
    State((driver, authn)): State<(Driver, AuthnDriver)>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<NoteRequest>,
) -> RestResult<(StatusCode, Json<NoteResponse>)> {
    let id = NoteId::new(id)?;
    let user = get_session_user(&authn, &headers).await?;

    let (note, created) = driver.put_note(user.username(), id, request.text).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(NoteResponse::new(note, None)?)))
}
