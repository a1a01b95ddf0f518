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

//! Database abstraction to manipulate users, sessions and one-time codes.

use crate::model::{AccessToken, CodePurpose, HashedPassword, OneTimeCode, Session, User};
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use iii_iv_core::db::{DbError, DbResult, Executor, ensure_one_upsert};
use iii_iv_core::model::{EmailAddress, PhoneNumber, Username};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use std::str::FromStr;
use time::OffsetDateTime;


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

/// Converts a code as stored in the database.  The sign is irrelevant for storage purposes.
fn code_from_db(code: Option<i64>) -> Option<u64> {
    code.map(|i| i as u64)
}

/// Converts a code into its database representation.
fn code_to_db(code: Option<u64>) -> Option<i64> {
    code.map(|i| i as i64)
}

/// Assembles a `User` from the raw values of a `users` row.
fn build_user(
    username: String,
    password: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    activation_code: Option<i64>,
    last_login: Option<OffsetDateTime>,
) -> DbResult<User> {
    let email = email.map(EmailAddress::new).transpose()?;
    let phone = phone.map(PhoneNumber::new).transpose()?;

    let mut user = User::new(Username::new(username)?)
        .with_password(password.map(HashedPassword::new))
        .with_email(email)
        .with_phone(phone)
        .with_activation_code(code_from_db(activation_code));
    if let Some(last_login) = last_login {
        user = user.with_last_login(last_login);
    }
    Ok(user)
}

/// Builds a `User` from a PostgreSQL row that contains all user columns.
#[cfg(feature = "postgres")]
fn user_from_postgres_row(row: &PgRow) -> DbResult<User> {
    let username: String = row.try_get("username").map_err(postgres::map_sqlx_error)?;
    let password: Option<String> = row.try_get("password").map_err(postgres::map_sqlx_error)?;
    let email: Option<String> = row.try_get("email").map_err(postgres::map_sqlx_error)?;
    let phone: Option<String> = row.try_get("phone").map_err(postgres::map_sqlx_error)?;
    let activation_code: Option<i64> =
        row.try_get("activation_code").map_err(postgres::map_sqlx_error)?;
    let last_login: Option<OffsetDateTime> =
        row.try_get("last_login").map_err(postgres::map_sqlx_error)?;

    build_user(username, password, email, phone, activation_code, last_login)
}

/// Builds a `User` from a SQLite row that contains all user columns.
#[cfg(any(feature = "sqlite", test))]
fn user_from_sqlite_row(row: &SqliteRow) -> DbResult<User> {
    let username: String = row.try_get("username").map_err(sqlite::map_sqlx_error)?;
    let password: Option<String> = row.try_get("password").map_err(sqlite::map_sqlx_error)?;
    let email: Option<String> = row.try_get("email").map_err(sqlite::map_sqlx_error)?;
    let phone: Option<String> = row.try_get("phone").map_err(sqlite::map_sqlx_error)?;
    let activation_code: Option<i64> =
        row.try_get("activation_code").map_err(sqlite::map_sqlx_error)?;
    let last_login_sec: Option<i64> =
        row.try_get("last_login_sec").map_err(sqlite::map_sqlx_error)?;
    let last_login_nsec: Option<i64> =
        row.try_get("last_login_nsec").map_err(sqlite::map_sqlx_error)?;

    let last_login = match (last_login_sec, last_login_nsec) {
        (Some(sec), Some(nsec)) => Some(build_timestamp(sec, nsec)?),
        (None, None) => None,
        (_, _) => {
            return Err(DbError::DataIntegrityError(
                "Inconsistent values for last_login".to_owned(),
            ));
        }
    };

    build_user(username, password, email, phone, activation_code, last_login)
}

/// Builds a `Session` from a PostgreSQL row.
#[cfg(feature = "postgres")]
fn session_from_postgres_row(row: &PgRow) -> DbResult<Session> {
    let access_token: String = row.try_get("access_token").map_err(postgres::map_sqlx_error)?;
    let username: String = row.try_get("username").map_err(postgres::map_sqlx_error)?;
    let login_time: OffsetDateTime =
        row.try_get("login_time").map_err(postgres::map_sqlx_error)?;

    Ok(Session::new(AccessToken::new(access_token)?, Username::new(username)?, login_time))
}

/// Builds a `Session` from a SQLite row.
#[cfg(any(feature = "sqlite", test))]
fn session_from_sqlite_row(row: &SqliteRow) -> DbResult<Session> {
    let access_token: String = row.try_get("access_token").map_err(sqlite::map_sqlx_error)?;
    let username: String = row.try_get("username").map_err(sqlite::map_sqlx_error)?;
    let login_time_sec: i64 = row.try_get("login_time_sec").map_err(sqlite::map_sqlx_error)?;
    let login_time_nsec: i64 = row.try_get("login_time_nsec").map_err(sqlite::map_sqlx_error)?;

    Ok(Session::new(
        AccessToken::new(access_token)?,
        Username::new(username)?,
        build_timestamp(login_time_sec, login_time_nsec)?,
    ))
}

/// Creates a new user named `username`, with an optional `password` in hashed form and an
/// optional `email` address or `phone` number.  Users with a password need at least one of the
/// two, and users with none of the three are anonymous.  The user is created as activated (no
/// activation code) and as not having logged in.
pub(crate) async fn create_user(
    ex: &mut Executor,
    username: Username,
    password: Option<HashedPassword>,
    email: Option<EmailAddress>,
    phone: Option<PhoneNumber>,
) -> DbResult<User> {
    if password.is_some() && email.is_none() && phone.is_none() {
        return Err(DbError::BackendError(
            "Users with a password need an email address or a phone number".to_owned(),
        ));
    }

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "INSERT INTO users (username, password, email, phone) VALUES ($1, $2, $3, $4)";
            sqlx::query(query_str)
                .bind(username.as_str())
                .bind(password.as_ref().map(HashedPassword::as_str))
                .bind(email.as_ref().map(EmailAddress::as_str))
                .bind(phone.as_ref().map(PhoneNumber::as_str))
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str =
                "INSERT INTO users (username, password, email, phone) VALUES (?, ?, ?, ?)";
            sqlx::query(query_str)
                .bind(username.as_str())
                .bind(password.as_ref().map(HashedPassword::as_str))
                .bind(email.as_ref().map(EmailAddress::as_str))
                .bind(phone.as_ref().map(PhoneNumber::as_str))
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    if rows_affected != 1 {
        return Err(DbError::BackendError("Insertion affected more than one row".to_owned()));
    }

    Ok(User::new(username).with_password(password).with_email(email).with_phone(phone))
}

/// Gets the user whose `column` matches `value`.  `column` must be a unique column of the
/// `users` table.
async fn get_user_where(ex: &mut Executor, column: &'static str, value: &str) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!("SELECT * FROM users WHERE {} = $1", column);
            let row = sqlx::query(&query_str)
                .bind(value)
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            user_from_postgres_row(&row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!("SELECT * FROM users WHERE {} = ?", column);
            let row = sqlx::query(&query_str)
                .bind(value)
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            user_from_sqlite_row(&row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets information about an existing user named `username`.
pub async fn get_user_by_username(ex: &mut Executor, username: &Username) -> DbResult<User> {
    get_user_where(ex, "username", username.as_str()).await
}

/// Gets information about the user that owns the `email` address.
pub async fn get_user_by_email(ex: &mut Executor, email: &EmailAddress) -> DbResult<User> {
    get_user_where(ex, "email", email.as_str()).await
}

/// Gets information about the user that owns the `phone` number.
pub async fn get_user_by_phone(ex: &mut Executor, phone: &PhoneNumber) -> DbResult<User> {
    get_user_where(ex, "phone", phone.as_str()).await
}

/// Converts the number of rows affected by an update of a single entity into a result.
fn single_update(rows_affected: u64) -> DbResult<()> {
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        _ => Err(DbError::BackendError("Update affected more than one row".to_owned())),
    }
}

/// Updates an existing user `username` to record a login at `last_login`.
pub(crate) async fn update_user_last_login(
    ex: &mut Executor,
    username: &Username,
    last_login: OffsetDateTime,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "UPDATE users SET last_login = $1 WHERE username = $2";
            sqlx::query(query_str)
                .bind(last_login)
                .bind(username.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (last_login_sec, last_login_nsec) = unpack_timestamp(last_login)?;

            let query_str = "
                UPDATE users SET last_login_sec = ?, last_login_nsec = ?
                WHERE username = ?";
            sqlx::query(query_str)
                .bind(last_login_sec)
                .bind(last_login_nsec)
                .bind(username.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    single_update(rows_affected)
}

/// Updates the activation code of an existing user, either to a new code or to nothing to
/// indicate that the user is active.
pub(crate) async fn set_user_activation_code(
    ex: &mut Executor,
    user: User,
    code: Option<u64>,
) -> DbResult<User> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "UPDATE users SET activation_code = $1 WHERE username = $2";
            sqlx::query(query_str)
                .bind(code_to_db(code))
                .bind(user.username().as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "UPDATE users SET activation_code = ? WHERE username = ?";
            sqlx::query(query_str)
                .bind(code_to_db(code))
                .bind(user.username().as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    single_update(rows_affected)?;
    Ok(user.with_activation_code(code))
}

/// Replaces the password of the existing user `username` with `password`.
pub(crate) async fn set_user_password(
    ex: &mut Executor,
    username: &Username,
    password: &HashedPassword,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "UPDATE users SET password = $1 WHERE username = $2";
            sqlx::query(query_str)
                .bind(password.as_str())
                .bind(username.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "UPDATE users SET password = ? WHERE username = ?";
            sqlx::query(query_str)
                .bind(password.as_str())
                .bind(username.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    single_update(rows_affected)
}

/// Gets a session from its access token.  Sessions marked as deleted (logged out) are
/// ignored.
pub(crate) async fn get_session(
    ex: &mut Executor,
    access_token: &AccessToken,
) -> DbResult<Session> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT access_token, username, login_time
                FROM sessions
                WHERE access_token = $1 AND logout_time IS NULL";
            let row = sqlx::query(query_str)
                .bind(access_token.as_str())
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            session_from_postgres_row(&row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT access_token, username, login_time_sec, login_time_nsec
                FROM sessions
                WHERE access_token = ? AND logout_time_sec IS NULL";
            let row = sqlx::query(query_str)
                .bind(access_token.as_str())
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            session_from_sqlite_row(&row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Saves a new session.
pub(crate) async fn put_session(ex: &mut Executor, session: &Session) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "INSERT INTO sessions (access_token, username, login_time) VALUES ($1, $2, $3)";
            sqlx::query(query_str)
                .bind(session.access_token().as_str())
                .bind(session.username().as_str())
                .bind(session.login_time())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (login_time_sec, login_time_nsec) = unpack_timestamp(session.login_time())?;

            let query_str = "
                INSERT INTO sessions (access_token, username, login_time_sec, login_time_nsec)
                VALUES (?, ?, ?, ?)";
            sqlx::query(query_str)
                .bind(session.access_token().as_str())
                .bind(session.username().as_str())
                .bind(login_time_sec)
                .bind(login_time_nsec)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    if rows_affected != 1 {
        return Err(DbError::BackendError("Insertion affected more than one row".to_owned()));
    }
    Ok(())
}

/// Marks the active session identified by `access_token` as logged out at `now`.
pub(crate) async fn delete_session(
    ex: &mut Executor,
    access_token: &AccessToken,
    now: OffsetDateTime,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE sessions SET logout_time = $1
                WHERE access_token = $2 AND logout_time IS NULL";
            sqlx::query(query_str)
                .bind(now)
                .bind(access_token.as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_sec, now_nsec) = unpack_timestamp(now)?;

            let query_str = "
                UPDATE sessions SET logout_time_sec = ?, logout_time_nsec = ?
                WHERE access_token = ? AND logout_time_sec IS NULL";
            sqlx::query(query_str)
                .bind(now_sec)
                .bind(now_nsec)
                .bind(access_token.as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    single_update(rows_affected)
}

/// Stores a one-time `code`, replacing any previous code for the same purpose and address.
pub(crate) async fn put_code(ex: &mut Executor, code: &OneTimeCode) -> DbResult<()> {
    let raw_code = code_to_db(Some(code.code));

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO otp_codes (purpose, address, code, expires)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (purpose, address)
                DO UPDATE SET code = $3, expires = $4";
            sqlx::query(query_str)
                .bind(code.purpose.as_str())
                .bind(&code.address)
                .bind(raw_code)
                .bind(code.expires)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (expires_sec, expires_nsec) = unpack_timestamp(code.expires)?;

            let query_str = "
                INSERT INTO otp_codes (purpose, address, code, expires_sec, expires_nsec)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (purpose, address)
                DO UPDATE SET
                    code = excluded.code,
                    expires_sec = excluded.expires_sec,
                    expires_nsec = excluded.expires_nsec";
            sqlx::query(query_str)
                .bind(code.purpose.as_str())
                .bind(&code.address)
                .bind(raw_code)
                .bind(expires_sec)
                .bind(expires_nsec)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    ensure_one_upsert(rows_affected)
}

/// Gets the one-time code issued for `purpose` to `address`, if any.
pub(crate) async fn get_code(
    ex: &mut Executor,
    purpose: CodePurpose,
    address: &str,
) -> DbResult<OneTimeCode> {
    let (raw_purpose, code, expires) = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT purpose, code, expires FROM otp_codes
                WHERE purpose = $1 AND address = $2";
            let row = sqlx::query(query_str)
                .bind(purpose.as_str())
                .bind(address)
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;

            let raw_purpose: String = row.try_get("purpose").map_err(postgres::map_sqlx_error)?;
            let code: i64 = row.try_get("code").map_err(postgres::map_sqlx_error)?;
            let expires: OffsetDateTime =
                row.try_get("expires").map_err(postgres::map_sqlx_error)?;
            (raw_purpose, code, expires)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT purpose, code, expires_sec, expires_nsec FROM otp_codes
                WHERE purpose = ? AND address = ?";
            let row = sqlx::query(query_str)
                .bind(purpose.as_str())
                .bind(address)
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;

            let raw_purpose: String = row.try_get("purpose").map_err(sqlite::map_sqlx_error)?;
            let code: i64 = row.try_get("code").map_err(sqlite::map_sqlx_error)?;
            let expires_sec: i64 = row.try_get("expires_sec").map_err(sqlite::map_sqlx_error)?;
            let expires_nsec: i64 = row.try_get("expires_nsec").map_err(sqlite::map_sqlx_error)?;
            (raw_purpose, code, build_timestamp(expires_sec, expires_nsec)?)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    Ok(OneTimeCode {
        purpose: CodePurpose::from_str(&raw_purpose)?,
        address: address.to_owned(),
        code: code as u64,
        expires,
    })
}

/// Deletes the one-time code issued for `purpose` to `address`.
pub(crate) async fn delete_code(
    ex: &mut Executor,
    purpose: CodePurpose,
    address: &str,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM otp_codes WHERE purpose = $1 AND address = $2";
            sqlx::query(query_str)
                .bind(purpose.as_str())
                .bind(address)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM otp_codes WHERE purpose = ? AND address = ?";
            sqlx::query(query_str)
                .bind(purpose.as_str())
                .bind(address)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    single_update(rows_affected)
}
