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

//! Operations on permissions.

use crate::db;
use crate::driver::AclDriver;
use crate::model::{Action, Grantee, Permission, Resource};
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};
use log::info;

impl AclDriver {
    /// Allows `grantee` to perform `action` on `resource`.  Giving an existing permission again
    /// is not an error.
    pub async fn give_permission(
        self,
        grantee: Grantee,
        resource: Resource,
        action: Action,
    ) -> DriverResult<()> {
        let permission = Permission { grantee, resource, action };
        db::put_permission(&mut self.db.ex().await?, &permission).await?;
        info!("Gave {} on {} to {}", permission.action, permission.resource, permission.grantee);
        Ok(())
    }

    /// Revokes a permission previously given to `grantee`.
    pub async fn revoke_permission(
        self,
        grantee: Grantee,
        resource: Resource,
        action: Action,
    ) -> DriverResult<()> {
        let permission = Permission { grantee, resource, action };
        match db::delete_permission(&mut self.db.ex().await?, &permission).await {
            Ok(()) => (),
            Err(DbError::NotFound) => {
                return Err(DriverError::NotFound(format!(
                    "{} does not have {} on {}",
                    permission.grantee, permission.action, permission.resource
                )));
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            "Revoked {} on {} from {}",
            permission.action, permission.resource, permission.grantee
        );
        Ok(())
    }

    /// Checks if `grantee` can perform `action` on `resource`, either directly or through any of
    /// the roles it belongs to.
    pub async fn has_permission(
        self,
        grantee: &Grantee,
        resource: &Resource,
        action: Action,
    ) -> DriverResult<bool> {
        let allowed =
            db::has_permission(&mut self.db.ex().await?, grantee, resource, action).await?;
        Ok(allowed)
    }

    /// Same as `has_permission` but fails with `Unauthorized` when the permission is missing.
    pub async fn require_permission(
        self,
        grantee: &Grantee,
        resource: &Resource,
        action: Action,
    ) -> DriverResult<()> {
        if !self.has_permission(grantee, resource, action).await? {
            return Err(DriverError::Unauthorized(format!(
                "{} is not allowed to {} {}",
                grantee, action, resource
            )));
        }
        Ok(())
    }

    /// Gets the permissions given directly to `grantee`.
    pub async fn list_permissions(self, grantee: &Grantee) -> DriverResult<Vec<Permission>> {
        let permissions = db::list_permissions(&mut self.db.ex().await?, grantee).await?;
        Ok(permissions)
    }
}
