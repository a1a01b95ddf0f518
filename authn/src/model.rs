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

//! Data types for authentication.

mod accesstoken;
pub use accesstoken::AccessToken;
mod code;
pub use code::{CodePurpose, OneTimeCode};
mod contact;
pub use contact::Contact;
mod passwords;
pub use passwords::{HashedPassword, Password, default_password_validator};
mod session;
pub use session::Session;
mod user;
pub use user::User;
