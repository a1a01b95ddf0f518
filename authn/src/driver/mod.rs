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

//! Business logic for user authentication.

use crate::db;
use crate::model::{AccessToken, User};
use futures::lock::Mutex;
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::{Db, DbError, Executor};
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::env::get_optional_var;
use iii_iv_core::rest::BaseUrls;
use iii_iv_smtp::driver::SmtpMailer;
use log::warn;
use lru_time_cache::LruCache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

mod activate;
mod anonymous;
mod email;
pub use email::AuthnTemplates;
mod login;
mod logout;
mod otp;
mod password;
mod signup;
mod sms;
pub use sms::{LoggingSmsSender, SmsSender};
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Default number of sessions to keep cached in memory.
const DEFAULT_SESSIONS_CACHE_CAPACITY: usize = 10 * 1024;

/// Default amount of time to keep cached sessions in memory.
const DEFAULT_SESSIONS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default value for the `SESSION_MAX_AGE` setting when not specified.
const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default value for the `SESSION_MAX_SKEW` setting when not specified.
const DEFAULT_SESSION_MAX_SKEW: Duration = Duration::from_secs(60 * 60);

/// Default number of digits in one-time login codes.
const DEFAULT_OTP_CODE_LEN: u32 = 4;

/// Default validity period of one-time login codes.
const DEFAULT_OTP_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Default number of digits in password reset codes.
const DEFAULT_PASSWORD_RESET_CODE_LEN: u32 = 8;

/// Default validity period of password reset codes.
const DEFAULT_PASSWORD_RESET_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Configuration options for the authentication driver.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthnOptions {
    /// The number of sessions to keep cached in memory.
    pub sessions_cache_capacity: usize,

    /// The mount of time to keep cached sessions in memory.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub sessions_cache_ttl: Duration,

    /// The amount of time we consider sessions valid for.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub session_max_age: Duration,

    /// The amount of time we tolerate in clock skew when validating sessions.  We should never see
    /// this, except if we end up serving requests from different machines and their clocks aren't
    /// properly synchronized.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub session_max_skew: Duration,

    /// Number of digits in the codes sent for one-time logins.
    pub otp_code_len: u32,

    /// How long one-time login codes remain valid for.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub otp_max_age: Duration,

    /// Number of digits in the codes sent for password resets.
    pub password_reset_code_len: u32,

    /// How long password reset codes remain valid for.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub password_reset_max_age: Duration,
}

impl Default for AuthnOptions {
    fn default() -> Self {
        Self {
            sessions_cache_ttl: DEFAULT_SESSIONS_CACHE_TTL,
            sessions_cache_capacity: DEFAULT_SESSIONS_CACHE_CAPACITY,
            session_max_age: DEFAULT_SESSION_MAX_AGE,
            session_max_skew: DEFAULT_SESSION_MAX_SKEW,
            otp_code_len: DEFAULT_OTP_CODE_LEN,
            otp_max_age: DEFAULT_OTP_MAX_AGE,
            password_reset_code_len: DEFAULT_PASSWORD_RESET_CODE_LEN,
            password_reset_max_age: DEFAULT_PASSWORD_RESET_MAX_AGE,
        }
    }
}

impl AuthnOptions {
    /// Creates a new set of options from environment variables.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            sessions_cache_capacity: get_optional_var::<usize>(prefix, "SESSIONS_CACHE_CAPACITY")?
                .unwrap_or(DEFAULT_SESSIONS_CACHE_CAPACITY),
            sessions_cache_ttl: get_optional_var::<Duration>(prefix, "SESSIONS_CACHE_TTL")?
                .unwrap_or(DEFAULT_SESSIONS_CACHE_TTL),
            session_max_age: get_optional_var::<Duration>(prefix, "SESSION_MAX_AGE")?
                .unwrap_or(DEFAULT_SESSION_MAX_AGE),
            session_max_skew: get_optional_var::<Duration>(prefix, "SESSION_MAX_SKEW")?
                .unwrap_or(DEFAULT_SESSION_MAX_SKEW),
            otp_code_len: get_optional_var::<u32>(prefix, "OTP_CODE_LEN")?
                .unwrap_or(DEFAULT_OTP_CODE_LEN),
            otp_max_age: get_optional_var::<Duration>(prefix, "OTP_MAX_AGE")?
                .unwrap_or(DEFAULT_OTP_MAX_AGE),
            password_reset_code_len: get_optional_var::<u32>(prefix, "PASSWORD_RESET_CODE_LEN")?
                .unwrap_or(DEFAULT_PASSWORD_RESET_CODE_LEN),
            password_reset_max_age: get_optional_var::<Duration>(
                prefix,
                "PASSWORD_RESET_MAX_AGE",
            )?
            .unwrap_or(DEFAULT_PASSWORD_RESET_MAX_AGE),
        })
    }
}

/// Generates a random numeric code of `len` digits.
fn new_code(len: u32) -> DriverResult<u64> {
    iii_iv_core::random::numeric_code(len).map_err(DriverError::BackendError)
}

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Clone)]
pub struct AuthnDriver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Service to send email notifications with.
    mailer: Arc<dyn SmtpMailer + Send + Sync>,

    /// Service to send text messages with.
    sms: Arc<dyn SmsSender + Send + Sync>,

    /// Email templates for all messages sent by the authentication flows.
    templates: Arc<AuthnTemplates>,

    /// Base URLs of the running service.
    base_urls: Arc<BaseUrls>,

    /// Authentication realm to return to requests.
    realm: &'static str,

    /// Options for the authentication driver.
    opts: AuthnOptions,

    /// Cache of sessions.
    sessions_cache: Arc<Mutex<LruCache<AccessToken, DriverResult<Arc<User>>>>>,
}

impl AuthnDriver {
    /// Creates a new driver backed by the given dependencies.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        mailer: Arc<dyn SmtpMailer + Send + Sync>,
        sms: Arc<dyn SmsSender + Send + Sync>,
        templates: AuthnTemplates,
        base_urls: Arc<BaseUrls>,
        realm: &'static str,
        opts: AuthnOptions,
    ) -> Self {
        let sessions_cache = LruCache::with_expiry_duration_and_capacity(
            opts.sessions_cache_ttl,
            opts.sessions_cache_capacity,
        );
        let sessions_cache = Arc::from(Mutex::from(sessions_cache));

        Self {
            db,
            clock,
            mailer,
            sms,
            templates: Arc::from(templates),
            base_urls,
            realm,
            opts,
            sessions_cache,
        }
    }

    /// Gets the authentication realm.
    pub(crate) fn realm(&self) -> &'static str {
        self.realm
    }

    /// Decodes the session in `token`, validates it at `now` and returns the user that owns the
    /// session.
    ///
    /// This is an internal helper for `get_session` that does not perform any caching.
    async fn get_session_uncached(
        &self,
        ex: &mut Executor,
        now: OffsetDateTime,
        token: &AccessToken,
    ) -> DriverResult<User> {
        let session = match db::get_session(ex, token).await {
            Ok(session) => session,
            Err(DbError::NotFound) => {
                return Err(DriverError::Unauthorized("Invalid session".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        if !session.is_valid_at(now, self.opts.session_max_age, self.opts.session_max_skew) {
            return Err(DriverError::Unauthorized(
                "Session expired; please log in again".to_owned(),
            ));
        }

        Ok(db::get_user_by_username(ex, session.username()).await?)
    }

    /// Decodes the session in `token`, validates it and returns the user that owns the session.
    ///
    /// Both OK and error results come from an internal cache, which should have been configured to
    /// evict entries relatively quickly.  In general, the cache should only hold entries for the
    /// predicted length of a frontend interaction.
    pub async fn get_session(&self, token: AccessToken) -> DriverResult<Arc<User>> {
        {
            let mut cache = self.sessions_cache.lock().await;
            if let Some(result) = cache.get(&token) {
                return result.clone();
            }
        }

        let mut ex = self.db.ex().await?;
        let now = self.clock.now_utc();
        let result = self.get_session_uncached(&mut ex, now, &token).await.map(Arc::from);

        let mut cache = self.sessions_cache.lock().await;
        if let Some(old_result) = cache.insert(token, result.clone()) {
            if old_result.as_ref() != result.as_ref() {
                warn!(
                    "Cache insertion race detected with inconsistent values: {:?} != {:?}",
                    old_result, result
                );
            }
        }

        result
    }

    /// Drops any cached validation result for `token`.
    async fn forget_session(&self, token: &AccessToken) {
        let mut cache = self.sessions_cache.lock().await;
        cache.remove(token);
    }
}
