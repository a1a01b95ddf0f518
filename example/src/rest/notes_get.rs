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

//! API to list the notes that carry a tag.

use crate::driver::Driver;
use crate::rest::NoteResponse;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use iii_iv_authn::driver::AuthnDriver;
use iii_iv_authn::rest::get_session_user;
use iii_iv_core::rest::{EmptyBody, RestResult};
use serde::{Deserialize, Serialize};

/// Query parameters for this API.
#[derive(Default, Deserialize, Serialize)]
pub(crate) struct ListQuery {
    /// Tag to look for, without its leading `#`.
    pub(crate) tag: String,
}

/// GET handler for this API.
pub(crate) async fn handler(
    State((driver, authn)): State<(Driver, AuthnDriver)>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
    _: EmptyBody,
) -> RestResult<Json<Vec<NoteResponse>>> {
    let user = get_session_user(&authn, &headers).await?;

    let notes = driver.list_notes_with_tag(user.username(), &query.tag).await?;

    let mut response = Vec::with_capacity(notes.len());
    for note in notes {
        response.push(NoteResponse::new(note, None)?);
    }
    Ok(Json(response))
}
