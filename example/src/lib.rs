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

//! Sample notes service built on top of the III-IV crates.
//!
//! Users authenticate via the `authn` endpoints and then store free-form notes.  Every note is
//! protected by access control entries and a background task indexes the `#hashtags` in its text
//! so that notes can be looked up by tag.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use axum::Router;
use iii_iv_acl::driver::AclDriver;
use iii_iv_authn::driver::{AuthnDriver, AuthnOptions, AuthnTemplates, LoggingSmsSender};
use iii_iv_core::clocks::Clock;
use iii_iv_core::config::Config;
use iii_iv_core::db::{Db, DbResult};
use iii_iv_core::lifecycle::{DEFAULT_STOP_TIMEOUT, Lifecycle};
use iii_iv_core::logging::Logger;
use iii_iv_core::rest::middleware::{request_id, request_logger};
use iii_iv_core::rest::{BaseUrls, build_router, health_router};
use iii_iv_queue::driver::{Client, Worker, WorkerOptions};
use iii_iv_smtp::driver::SmtpMailer;
use iii_iv_smtp::model::EmailTemplate;
use iii_iv_tags::driver::TagsDriver;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod db;
mod driver;
use driver::{Driver, IndexNoteTask, Indexer};
pub(crate) mod model;
mod rest;

/// Authentication realm returned to clients.
const REALM: &str = "notes";

/// Body of the email sent to confirm a new account.
const ACTIVATION_BODY: &str = "Hello %username%,

Please visit %activate_url% to activate your account.
";

/// Body of the email sent to reset a password.
const PASSWORD_RESET_BODY: &str = "Hello %username%,

Use code %code% to reset your password.  If you did not ask for this, ignore this message.
";

/// Body of the email sent with a one-time login code.
const OTP_BODY: &str = "Your login code is %code%.
";

/// Options for the service itself, read from the `[service]` configuration section.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceOptions {
    /// Port to listen on.
    pub port: u16,

    /// Public URL of the service, used to build links in emails.
    pub base_url: String,

    /// Sender of all emails.
    pub email_from: String,

    /// Whether to serve the access control API, which performs no authentication checks.
    pub expose_acl_api: bool,

    /// Maximum time to wait for in-flight work when stopping.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub stop_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            port: 3000,
            base_url: "http://localhost:3000/".to_owned(),
            email_from: "Notes <noreply@example.com>".to_owned(),
            expose_acl_api: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Loads the section `key` of `config` into a `T`.
pub fn load_section<T: serde::de::DeserializeOwned + Default>(
    config: &Config,
    key: &str,
) -> Result<T, String> {
    config.load_section(key).map_err(|e| e.to_string())
}

/// Creates the templates for the emails of the authentication flows, all sent from `from`.
fn make_templates(from: &str) -> Result<AuthnTemplates, String> {
    let template = |subject: &str, body: &str| {
        EmailTemplate::new(from, subject, body).map_err(|e| e.to_string())
    };
    Ok(AuthnTemplates {
        activation: template("Activate your notes account", ACTIVATION_BODY)?,
        password_reset: template("Reset your notes password", PASSWORD_RESET_BODY)?,
        otp: template("Your notes login code", OTP_BODY)?,
    })
}

/// Initializes the schemas of all the services backing the notes service.
pub async fn init_schemas(db: &(dyn Db + Send + Sync)) -> DbResult<()> {
    let mut ex = db.ex().await?;
    iii_iv_acl::db::init_schema(&mut ex).await?;
    iii_iv_authn::db::init_schema(&mut ex).await?;
    iii_iv_queue::db::init_schema(&mut ex).await?;
    iii_iv_smtp::db::init_schema(&mut ex).await?;
    iii_iv_tags::db::init_schema(&mut ex).await?;
    db::init_schema(&mut ex).await
}

/// Wires all services together as described by `config` and returns the router that serves
/// them.
///
/// The indexing worker is started under `lifecycle`, so the caller is responsible for stopping
/// it.  The database in `db` must have been initialized with `init_schemas`.
pub async fn app(
    config: &Config,
    db: Arc<dyn Db + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    mailer: Arc<dyn SmtpMailer + Send + Sync>,
    logger: Arc<dyn Logger>,
    lifecycle: &Lifecycle,
) -> Result<Router, String> {
    let opts = load_section::<ServiceOptions>(config, "service")?;
    let authn_opts = load_section::<AuthnOptions>(config, "authn")?;
    let worker_opts = load_section::<WorkerOptions>(config, "queue")?;

    let base_url = Url::parse(&opts.base_url)
        .map_err(|e| format!("Invalid base_url '{}': {}", opts.base_url, e))?;
    let base_urls = Arc::new(BaseUrls::new(base_url, None)?);

    let authn = AuthnDriver::new(
        db.clone(),
        clock.clone(),
        mailer,
        Arc::new(LoggingSmsSender::new(logger.clone())),
        make_templates(&opts.email_from)?,
        base_urls,
        REALM,
        authn_opts,
    );
    let acl = AclDriver::new(db.clone());
    let tags = TagsDriver::new(db.clone());

    let indexer = Indexer::new(db.clone(), tags.clone());
    let worker = Worker::new(
        db.clone(),
        clock.clone(),
        logger.clone(),
        worker_opts,
        move |task: IndexNoteTask| indexer.clone().index(task),
    );
    let client = Client::new(db.clone(), clock.clone()).with_worker(&worker);
    let notifier = worker.notifier();
    worker.start(lifecycle).await;

    let driver = Driver::new(db, clock, acl.clone(), tags, client.clone());

    let mut routes = iii_iv_authn::rest::api_routes(authn.clone(), "/api", None)?;
    if opts.expose_acl_api {
        routes.extend(iii_iv_acl::rest::api_routes(acl, "/api/acl")?);
    }
    routes.extend(iii_iv_queue::rest::api_routes(client)?);
    routes.extend(iii_iv_queue::rest::worker_cron_routes(vec![notifier])?);
    routes.extend(rest::api_routes(driver, authn, "/api")?);

    let router = build_router(routes, &[request_id(), request_logger(logger)]);
    Ok(router.merge(health_router("/health")))
}
