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

//! Common data types shared across services.
//!
//! Types in this module are newtypes over primitive values that guarantee, at construction time,
//! that the wrapped value is well-formed.  Parsing untrusted input into one of these types is the
//! only validation the upper layers need to do.

mod emailaddress;
pub use emailaddress::EmailAddress;
mod phonenumber;
pub use phonenumber::PhoneNumber;
mod username;
pub use username::Username;

/// Errors caused by invalid data in a model type.
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Result type for this module.
pub type ModelResult<T> = Result<T, ModelError>;
