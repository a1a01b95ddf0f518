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

//! Extends the driver with the `logout` method.

use crate::db;
use crate::driver::AuthnDriver;
use crate::model::AccessToken;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::Username;

impl AuthnDriver {
    /// Marks the session identified by `token` as deleted.  The session must belong to
    /// `username`.
    pub async fn logout(self, token: AccessToken, username: Username) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let session = db::get_session(tx.ex(), &token).await?;
        if session.username() != &username {
            return Err(DriverError::NotFound("Entity not found".to_owned()));
        }
        db::delete_session(tx.ex(), &token, now).await?;

        tx.commit().await?;

        self.forget_session(&token).await;
        Ok(())
    }
}
