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

//! Business logic for the service.

use iii_iv_acl::driver::AclDriver;
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::Db;
use iii_iv_queue::driver::Client;
use iii_iv_tags::driver::TagsDriver;
use std::sync::Arc;

mod indexer;
pub(crate) use indexer::{IndexNoteTask, Indexer};
mod notes;
#[cfg(test)]
pub(crate) mod testutils;

/// Business logic.
///
/// The public operations exposed by the driver are "one shot": they coordinate the notes
/// storage with the access control, tagging and queueing services, each of which commits its
/// own changes.  For this reason, these operations consume the driver in an attempt to minimize
/// the possibility of executing two operations.
#[derive(Clone)]
pub(crate) struct Driver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Access control service that protects the notes.
    acl: AclDriver,

    /// Tagging service that holds the hashtags of the notes.
    tags: TagsDriver,

    /// Client to enqueue indexing tasks.
    queue: Client,
}

impl Driver {
    /// Creates a new driver backed by the given injected components.
    pub(crate) fn new(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        acl: AclDriver,
        tags: TagsDriver,
        queue: Client,
    ) -> Self {
        Self { db, clock, acl, tags, queue }
    }
}
