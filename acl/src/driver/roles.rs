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

//! Operations on roles and their members.

use crate::db;
use crate::driver::AclDriver;
use crate::model::{Grantee, RoleName};
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};

impl AclDriver {
    /// Creates a new role called `name`.  Permissions given to the role as a grantee apply to all
    /// of its members.
    pub async fn create_role(self, name: RoleName) -> DriverResult<()> {
        match db::put_role(&mut self.db.ex().await?, &name).await {
            Ok(()) => Ok(()),
            Err(DbError::AlreadyExists) => {
                Err(DriverError::AlreadyExists(format!("Role {} already exists", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes `grantee` a member of `role`.
    pub async fn add_role_member(self, role: RoleName, grantee: Grantee) -> DriverResult<()> {
        if grantee.role().is_some() {
            return Err(DriverError::InvalidInput(format!(
                "Role grantee {} cannot be a member of role {}",
                grantee, role
            )));
        }

        match db::put_role_member(&mut self.db.ex().await?, &role, &grantee).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound) => {
                Err(DriverError::NotFound(format!("Role {} does not exist", role)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes `grantee` from `role`.
    pub async fn remove_role_member(self, role: RoleName, grantee: Grantee) -> DriverResult<()> {
        match db::delete_role_member(&mut self.db.ex().await?, &role, &grantee).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound) => {
                Err(DriverError::NotFound(format!("{} is not a member of {}", grantee, role)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gets the roles that `grantee` belongs to.
    pub async fn list_roles(self, grantee: &Grantee) -> DriverResult<Vec<RoleName>> {
        let roles = db::list_roles_of(&mut self.db.ex().await?, grantee).await?;
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::{Action, Resource};
    use iii_iv_core::model::Username;

    #[tokio::test]
    async fn test_create_role_duplicate() {
        let context = TestContext::setup().await;

        context.driver().create_role("admins".into()).await.unwrap();
        assert_eq!(
            DriverError::AlreadyExists("Role admins already exists".to_owned()),
            context.driver().create_role("admins".into()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_members() {
        let context = TestContext::setup().await;

        let alice = Grantee::from("alice");
        context.driver().create_role("admins".into()).await.unwrap();
        context.driver().create_role("editors".into()).await.unwrap();
        context.driver().add_role_member("editors".into(), alice.clone()).await.unwrap();
        context.driver().add_role_member("admins".into(), alice.clone()).await.unwrap();
        context.driver().add_role_member("admins".into(), alice.clone()).await.unwrap();

        assert_eq!(
            vec![RoleName::from("admins"), RoleName::from("editors")],
            context.driver().list_roles(&alice).await.unwrap()
        );

        context.driver().remove_role_member("admins".into(), alice.clone()).await.unwrap();
        assert_eq!(
            vec![RoleName::from("editors")],
            context.driver().list_roles(&alice).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_add_role_member_rejects_roles() {
        let context = TestContext::setup().await;

        context.driver().create_role("admins".into()).await.unwrap();
        context.driver().create_role("editors".into()).await.unwrap();
        let editors = Grantee::from(RoleName::from("editors"));
        assert_eq!(
            DriverError::InvalidInput(
                "Role grantee role:editors cannot be a member of role admins".to_owned()
            ),
            context.driver().add_role_member("admins".into(), editors).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_user_named_like_role_does_not_inherit_grants() {
        let context = TestContext::setup().await;

        let admins = RoleName::from("admins");
        let secret = Resource::from("secret");
        context.driver().create_role(admins.clone()).await.unwrap();
        context
            .driver()
            .give_permission(Grantee::from(admins.clone()), secret.clone(), Action::Write)
            .await
            .unwrap();

        let user = Grantee::from(&Username::new("admins").unwrap());
        assert!(context.driver().list_roles(&user).await.unwrap().is_empty());
        assert!(!context.driver().has_permission(&user, &secret, Action::Write).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_role_member_unknown_role() {
        let context = TestContext::setup().await;

        assert_eq!(
            DriverError::NotFound("Role admins does not exist".to_owned()),
            context.driver().add_role_member("admins".into(), "alice".into()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_remove_role_member_not_member() {
        let context = TestContext::setup().await;

        context.driver().create_role("admins".into()).await.unwrap();
        assert_eq!(
            DriverError::NotFound("alice is not a member of admins".to_owned()),
            context.driver().remove_role_member("admins".into(), "alice".into()).await.unwrap_err()
        );
    }
}
