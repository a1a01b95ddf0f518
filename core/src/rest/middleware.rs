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

//! Middlewares shared by all services.

use crate::lifecycle::panic_message;
use crate::logging::{Logger, Tags};
use crate::rest::{Middleware, RestError};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose;
use log::error;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use uuid::Uuid;

/// Name of the response header that carries the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Unique identifier assigned to every request, available as a request extension.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestId(pub Uuid);

/// Assigns a `RequestId` to the request and echoes it in the response headers.
async fn request_id_mw(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4();
    request.extensions_mut().insert(RequestId(id));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Middleware that assigns a fresh `RequestId` to every request.
pub fn request_id() -> Middleware {
    Middleware::from_layer(from_fn(request_id_mw))
}

/// Extracts the username from a basic authentication header, if any.
fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, _password) = decoded.split_once(':')?;
    Some(user.to_owned())
}

/// Logs the outcome of every request via `logger`.
async fn request_logger_mw(
    State(logger): State<Arc<dyn Logger>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let user = basic_auth_user(request.headers());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut tags = Tags::new();
    tags.insert("method".to_owned(), Value::from(method.as_str()));
    tags.insert("url".to_owned(), Value::from(path.as_str()));
    tags.insert("statusCode".to_owned(), Value::from(status));
    tags.insert("durationMs".to_owned(), Value::from(duration_ms));
    if let Some(user) = user {
        tags.insert("user".to_owned(), Value::from(user));
    }
    logger.with_tags(tags).info(&format!("{} {} {}", method, path, status));

    response
}

/// Middleware that logs every request and its response status through `logger`.
pub fn request_logger(logger: Arc<dyn Logger>) -> Middleware {
    Middleware::from_layer(from_fn_with_state(logger, request_logger_mw))
}

/// Converts a panic raised by a handler into an internal server error.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    error!("Recovered from a panic while handling HTTP request: {}", panic_message(&*payload));
    RestError::InternalError("Internal server error".to_owned()).into_response()
}

/// Middleware that turns handler panics into 500 responses.
pub fn catch_panic() -> Middleware {
    Middleware::from_layer(CatchPanicLayer::custom(panic_response))
}
