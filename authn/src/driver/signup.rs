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

//! Extends the driver with the `signup` method.

use crate::db;
use crate::driver::email::send_activation_code;
use crate::driver::{AuthnDriver, new_code};
use crate::model::{Password, default_password_validator};
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::{EmailAddress, Username};

/// Number of digits in account activation codes.
const ACTIVATION_CODE_LEN: u32 = 8;

impl AuthnDriver {
    /// Creates a new account for a user.
    ///
    /// The account starts inactive and an activation code is sent to `email`.
    pub async fn signup(
        self,
        username: Username,
        password: Password,
        email: EmailAddress,
    ) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;

        let password = password.validate_and_hash(default_password_validator)?;

        let result = db::create_user(tx.ex(), username, Some(password), Some(email), None).await;
        let user = match result {
            Ok(user) => user,
            Err(DbError::AlreadyExists) => {
                return Err(DriverError::AlreadyExists(
                    "Username or email address are already registered".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let activation_code = new_code(ACTIVATION_CODE_LEN)?;
        let user = db::set_user_activation_code(tx.ex(), user, Some(activation_code)).await?;

        let email = user.email().ok_or_else(|| {
            DriverError::BackendError("Newly-created user lost its email".to_owned())
        })?;
        send_activation_code(
            self.mailer.as_ref(),
            &self.templates.activation,
            &self.base_urls,
            user.username(),
            email,
            activation_code,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
