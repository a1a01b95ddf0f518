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

//! Serves the sample notes service.
//!
//! The configuration is read from the TOML file named by `EXAMPLE_CONFIG`, with the optional
//! `;`-separated TOML snippets in `EXAMPLE_CONFIG_OVERRIDES` merged on top of it.  The database
//! connection settings come from the `PGSQL_PROD_*` environment variables.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use iii_iv_core::clocks::{Clock, SystemClock};
use iii_iv_core::config::Config;
use iii_iv_core::db::Db;
use iii_iv_core::db::postgres::{PostgresDb, PostgresOptions};
use iii_iv_core::env::{get_optional_var, get_required_var};
use iii_iv_core::lifecycle::Lifecycle;
use iii_iv_core::logging::{self, FacadeLogger, Logger, LoggingOptions};
use iii_iv_core::rest::serve;
use iii_iv_example::{ServiceOptions, app, init_schemas, load_section};
use iii_iv_smtp::driver::{LoggingMailer, SmtpDriver, SmtpMailer, SmtpOptions, new_prod_driver};
use log::{error, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::sync::Arc;

/// Creates the mailer described by the `[smtp]` section of `config`, if any.  Without one,
/// emails are only logged via `logger`.
fn make_mailer(
    config: &Config,
    db: Arc<dyn Db + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    logger: Arc<dyn Logger>,
) -> Result<Arc<dyn SmtpMailer + Send + Sync>, String> {
    match config.value("smtp") {
        Some(value) => {
            let opts: SmtpOptions = value
                .clone()
                .try_into()
                .map_err(|e| format!("Invalid section 'smtp': {}", e))?;
            Ok(Arc::new(new_prod_driver(opts, db, clock)?))
        }
        None => {
            warn!("No smtp section in the configuration; emails will only be logged");
            let transport = Arc::new(LoggingMailer::new(logger));
            Ok(Arc::new(SmtpDriver::new(transport, db, clock, None)))
        }
    }
}

/// Runs the service until it is interrupted.
async fn run() -> Result<(), String> {
    let path = get_required_var::<String>("EXAMPLE", "CONFIG")?;
    let overrides = get_optional_var::<String>("EXAMPLE", "CONFIG_OVERRIDES")?.unwrap_or_default();
    let config = Config::new_with_key_overrides(&path, &overrides).map_err(|e| e.to_string())?;

    let logging_opts = load_section::<LoggingOptions>(&config, "logging")?;
    logging::init(&logging_opts)?;
    let logger: Arc<dyn Logger> =
        Arc::new(FacadeLogger::new("iii_iv_example", logging_opts.redact_fields.clone()));

    let opts = load_section::<ServiceOptions>(&config, "service")?;

    let db_opts = PostgresOptions::from_env("PGSQL_PROD")?;
    let db: Arc<dyn Db + Send + Sync> =
        Arc::new(PostgresDb::connect(db_opts).map_err(|e| e.to_string())?);
    init_schemas(db.as_ref()).await.map_err(|e| format!("Failed to initialize schemas: {}", e))?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock::default());
    let mailer = make_mailer(&config, db.clone(), clock.clone(), logger.clone())?;

    let lifecycle = Arc::new(Lifecycle::new(opts.stop_timeout));
    let router = app(&config, db.clone(), clock, mailer, logger, &lifecycle).await?;

    let stopper = lifecycle.clone();
    let interrupted = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot wait for interrupts; stopping now: {}", e);
        }
        info!("Shutting down");
        if !stopper.stop().await {
            warn!("Some background tasks did not stop cleanly");
        }
        db.close().await;
    });

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, opts.port));
    serve(addr, router, &lifecycle).await.map_err(|e| format!("Server failed: {}", e))?;

    interrupted.await.map_err(|e| format!("Shutdown did not complete: {}", e))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("iii-iv-example: {}", e);
        process::exit(1);
    }
}
