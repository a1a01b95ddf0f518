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

//! Database abstraction to manipulate permissions and roles.

use crate::model::{Action, Grantee, Permission, Resource, RoleName};
use futures::TryStreamExt;
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbError, DbResult, Executor};
use sqlx::Row;
use std::str::FromStr;


/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Builds a `Permission` for `grantee` from the raw `resource` and `action` stored in a row.
fn build_permission(grantee: &Grantee, resource: String, action: String) -> DbResult<Permission> {
    let resource = Resource::new(resource)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid resource: {}", e)))?;
    let action = Action::from_str(&action)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid action: {}", e)))?;
    Ok(Permission { grantee: grantee.clone(), resource, action })
}

/// Records `permission` unless it is already present.
pub(crate) async fn put_permission(ex: &mut Executor, permission: &Permission) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "INSERT INTO permissions (grantee, resource, action) VALUES ($1, $2, $3)
                    ON CONFLICT (grantee, resource, action) DO NOTHING";
            sqlx::query(query_str)
                .bind(permission.grantee.as_str())
                .bind(permission.resource.as_str())
                .bind(permission.action.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "INSERT INTO permissions (grantee, resource, action) VALUES (?, ?, ?)
                    ON CONFLICT (grantee, resource, action) DO NOTHING";
            sqlx::query(query_str)
                .bind(permission.grantee.as_str())
                .bind(permission.resource.as_str())
                .bind(permission.action.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    if rows_affected > 1 {
        return Err(DbError::BackendError(format!("Insert affected {} rows", rows_affected)));
    }
    Ok(())
}

/// Deletes `permission`.  Fails with `NotFound` if it was not granted.
pub(crate) async fn delete_permission(ex: &mut Executor, permission: &Permission) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "DELETE FROM permissions WHERE grantee = $1 AND resource = $2 AND action = $3";
            sqlx::query(query_str)
                .bind(permission.grantee.as_str())
                .bind(permission.resource.as_str())
                .bind(permission.action.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str =
                "DELETE FROM permissions WHERE grantee = ? AND resource = ? AND action = ?";
            sqlx::query(query_str)
                .bind(permission.grantee.as_str())
                .bind(permission.resource.as_str())
                .bind(permission.action.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Delete affected {} rows", n))),
    }
}

/// Checks if `grantee` can perform `action` on `resource`, either because the permission was
/// given directly or because it was given to a role that `grantee` belongs to.
///
/// Role grants are stored under `Grantee::ROLE_PREFIX` plus the role name, so only membership
/// rows can make a role's grants apply to a user.
pub(crate) async fn has_permission(
    ex: &mut Executor,
    grantee: &Grantee,
    resource: &Resource,
    action: Action,
) -> DbResult<bool> {
    let count: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT COUNT(*) AS count FROM permissions
                WHERE resource = $2 AND action = $3 AND (
                    grantee = $1 OR grantee IN (
                        SELECT $4::TEXT || roles.name FROM roles
                        JOIN role_members ON role_members.role_id = roles.id
                        WHERE role_members.grantee = $1))
            ";
            let row = sqlx::query(query_str)
                .bind(grantee.as_str())
                .bind(resource.as_str())
                .bind(action.as_str())
                .bind(Grantee::ROLE_PREFIX)
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("count").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT COUNT(*) AS count FROM permissions
                WHERE resource = ?2 AND action = ?3 AND (
                    grantee = ?1 OR grantee IN (
                        SELECT ?4 || roles.name FROM roles
                        JOIN role_members ON role_members.role_id = roles.id
                        WHERE role_members.grantee = ?1))
            ";
            let row = sqlx::query(query_str)
                .bind(grantee.as_str())
                .bind(resource.as_str())
                .bind(action.as_str())
                .bind(Grantee::ROLE_PREFIX)
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("count").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    Ok(count > 0)
}

/// Gets the permissions given directly to `grantee`, sorted by resource and action.
pub(crate) async fn list_permissions(
    ex: &mut Executor,
    grantee: &Grantee,
) -> DbResult<Vec<Permission>> {
    let mut permissions = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT resource, action FROM permissions WHERE grantee = $1
                ORDER BY resource, action";
            let mut rows = sqlx::query(query_str).bind(grantee.as_str()).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(postgres::map_sqlx_error)? {
                let resource: String = row.try_get("resource").map_err(postgres::map_sqlx_error)?;
                let action: String = row.try_get("action").map_err(postgres::map_sqlx_error)?;
                permissions.push(build_permission(grantee, resource, action)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT resource, action FROM permissions WHERE grantee = ?
                ORDER BY resource, action";
            let mut rows = sqlx::query(query_str).bind(grantee.as_str()).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(sqlite::map_sqlx_error)? {
                let resource: String = row.try_get("resource").map_err(sqlite::map_sqlx_error)?;
                let action: String = row.try_get("action").map_err(sqlite::map_sqlx_error)?;
                permissions.push(build_permission(grantee, resource, action)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(permissions)
}

/// Creates a new role called `name`.  Fails with `AlreadyExists` if the name is taken.
pub(crate) async fn put_role(ex: &mut Executor, name: &RoleName) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => sqlx::query("INSERT INTO roles (name) VALUES ($1)")
            .bind(name.as_str())
            .execute(ex)
            .await
            .map_err(postgres::map_sqlx_error)?
            .rows_affected(),

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlx::query("INSERT INTO roles (name) VALUES (?)")
            .bind(name.as_str())
            .execute(ex)
            .await
            .map_err(sqlite::map_sqlx_error)?
            .rows_affected(),

        #[allow(unused)]
        _ => unreachable!(),
    };
    if rows_affected != 1 {
        return Err(DbError::BackendError(format!("Insert created {} rows", rows_affected)));
    }
    Ok(())
}

/// Gets the internal identifier of the role called `name`.
async fn get_role_id(ex: &mut Executor, name: &RoleName) -> DbResult<i64> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let row = sqlx::query("SELECT id FROM roles WHERE name = $1")
                .bind(name.as_str())
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            let id: i32 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
            Ok(i64::from(id))
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let row = sqlx::query("SELECT id FROM roles WHERE name = ?")
                .bind(name.as_str())
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("id").map_err(sqlite::map_sqlx_error)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Makes `grantee` a member of the role called `role`, which must exist.  Adding an existing
/// member is not an error.
pub(crate) async fn put_role_member(
    ex: &mut Executor,
    role: &RoleName,
    grantee: &Grantee,
) -> DbResult<()> {
    let role_id = get_role_id(ex, role).await?;

    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let role_id = i32::try_from(role_id)
                .map_err(|e| DbError::DataIntegrityError(format!("Invalid role id: {}", e)))?;
            let query_str = "INSERT INTO role_members (role_id, grantee) VALUES ($1, $2)
                ON CONFLICT (role_id, grantee) DO NOTHING";
            sqlx::query(query_str)
                .bind(role_id)
                .bind(grantee.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "INSERT INTO role_members (role_id, grantee) VALUES (?, ?)
                ON CONFLICT (role_id, grantee) DO NOTHING";
            sqlx::query(query_str)
                .bind(role_id)
                .bind(grantee.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Removes `grantee` from the role called `role`.  Fails with `NotFound` if the role does not
/// exist or if `grantee` was not a member.
pub(crate) async fn delete_role_member(
    ex: &mut Executor,
    role: &RoleName,
    grantee: &Grantee,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM role_members
                WHERE role_id = (SELECT id FROM roles WHERE name = $1) AND grantee = $2";
            sqlx::query(query_str)
                .bind(role.as_str())
                .bind(grantee.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM role_members
                WHERE role_id = (SELECT id FROM roles WHERE name = ?) AND grantee = ?";
            sqlx::query(query_str)
                .bind(role.as_str())
                .bind(grantee.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Delete affected {} rows", n))),
    }
}

/// Gets the names of the roles that `grantee` belongs to, sorted alphabetically.
pub(crate) async fn list_roles_of(ex: &mut Executor, grantee: &Grantee) -> DbResult<Vec<RoleName>> {
    let mut roles = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT roles.name AS name FROM roles
                JOIN role_members ON role_members.role_id = roles.id
                WHERE role_members.grantee = $1 ORDER BY roles.name";
            let mut rows = sqlx::query(query_str).bind(grantee.as_str()).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(postgres::map_sqlx_error)? {
                let name: String = row.try_get("name").map_err(postgres::map_sqlx_error)?;
                roles.push(RoleName::new(name).map_err(|e| {
                    DbError::DataIntegrityError(format!("Invalid role name: {}", e))
                })?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT roles.name AS name FROM roles
                JOIN role_members ON role_members.role_id = roles.id
                WHERE role_members.grantee = ? ORDER BY roles.name";
            let mut rows = sqlx::query(query_str).bind(grantee.as_str()).fetch(ex);
            while let Some(row) = rows.try_next().await.map_err(sqlite::map_sqlx_error)? {
                let name: String = row.try_get("name").map_err(sqlite::map_sqlx_error)?;
                roles.push(RoleName::new(name).map_err(|e| {
                    DbError::DataIntegrityError(format!("Invalid role name: {}", e))
                })?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(roles)
}
