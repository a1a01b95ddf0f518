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

//! Business logic for permissions and roles.

use iii_iv_core::db::Db;
use std::sync::Arc;

mod permissions;
mod roles;

/// Business logic for access control.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Clone)]
pub struct AclDriver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,
}

impl AclDriver {
    /// Creates a new driver backed by the given injected components.
    pub fn new(db: Arc<dyn Db + Send + Sync>) -> Self {
        Self { db }
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use super::*;
    use crate::db;
    use iii_iv_core::db::Executor;

    /// State of a running test.
    pub(crate) struct TestContext {
        /// Database backing the driver.
        db: Arc<dyn Db + Send + Sync>,

        /// The driver under test.
        driver: AclDriver,
    }

    impl TestContext {
        /// Initializes a driver backed by an in-memory database.
        pub(crate) async fn setup() -> Self {
            let db = iii_iv_core::db::sqlite::testutils::setup().await;
            db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
            let db: Arc<dyn Db + Send + Sync> = Arc::new(db);
            let driver = AclDriver::new(db.clone());
            Self { db, driver }
        }

        /// Gets a direct executor against the database.
        pub(crate) async fn ex(&self) -> Executor {
            self.db.ex().await.unwrap()
        }

        /// Gets a copy of the driver.
        pub(crate) fn driver(&self) -> AclDriver {
            self.driver.clone()
        }
    }
}
