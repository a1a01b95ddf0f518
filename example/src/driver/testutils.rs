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

//! Test utilities for the business layer.

use crate::db;
use crate::driver::{Driver, IndexNoteTask, Indexer};
use crate::model::{Note, NoteId};
use iii_iv_acl::driver::AclDriver;
use iii_iv_core::clocks::testutils::SettableClock;
use iii_iv_core::db::{Db, DbError, Executor};
use iii_iv_core::logging::testutils::RecorderLogger;
use iii_iv_core::model::Username;
use iii_iv_queue::driver::{Client, Worker, WorkerOptions};
use iii_iv_tags::driver::TagsDriver;
use std::sync::Arc;
use time::macros::datetime;

/// State of a running test.
pub(crate) struct TestContext {
    /// Database shared by all services in the test.
    pub(crate) db: Arc<dyn Db + Send + Sync>,

    /// The clock used by all services, which tests can move at will.
    pub(crate) clock: Arc<SettableClock>,

    /// Access control service used by the driver.
    pub(crate) acl: AclDriver,

    /// Tagging service used by the driver.
    pub(crate) tags: TagsDriver,

    /// Queue client used by the driver.  Not connected to `worker`.
    pub(crate) client: Client,

    /// Worker that runs the indexing tasks on demand.
    worker: Worker,

    /// The driver under test.
    driver: Driver,
}

impl TestContext {
    /// Initializes all services backed by an in-memory database.
    pub(crate) async fn setup() -> Self {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::new(iii_iv_core::db::sqlite::testutils::setup().await);
        {
            let mut ex = db.ex().await.unwrap();
            db::init_schema(&mut ex).await.unwrap();
            iii_iv_acl::db::init_schema(&mut ex).await.unwrap();
            iii_iv_queue::db::init_schema(&mut ex).await.unwrap();
            iii_iv_tags::db::init_schema(&mut ex).await.unwrap();
        }
        let clock = Arc::new(SettableClock::new(datetime!(2023-06-01 10:00:00 UTC)));

        let acl = AclDriver::new(db.clone());
        let tags = TagsDriver::new(db.clone());
        let indexer = Indexer::new(db.clone(), tags.clone());
        let worker = Worker::new(
            db.clone(),
            clock.clone(),
            Arc::new(RecorderLogger::default()),
            WorkerOptions::default(),
            move |task: IndexNoteTask| indexer.clone().index(task),
        );
        let client = Client::new(db.clone(), clock.clone());
        let driver =
            Driver::new(db.clone(), clock.clone(), acl.clone(), tags.clone(), client.clone());

        Self { db, clock, acl, tags, client, worker, driver }
    }

    /// Gets a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Gets a copy of the driver.
    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    /// Gets an indexer backed by the same services as the driver.
    pub(crate) fn indexer(&self) -> Indexer {
        Indexer::new(self.db.clone(), self.tags.clone())
    }

    /// Runs all pending tasks until the queue is empty.
    pub(crate) async fn run_tasks(&self) {
        while self.worker.run_once().await.unwrap() {}
    }

    /// Creates or updates a note bypassing the driver, which means no permissions are granted.
    pub(crate) async fn put_note_directly(
        &self,
        id: &'static str,
        owner: &'static str,
        text: &str,
    ) {
        let note = Note::new(
            NoteId::from(id),
            Username::from(owner),
            text.to_owned(),
            datetime!(2023-01-01 00:00:00 UTC),
        )
        .unwrap();
        let mut ex = self.ex().await;
        if !db::create_note(&mut ex, &note).await.unwrap() {
            db::update_note_text(&mut ex, note.id(), note.text(), *note.updated()).await.unwrap();
        }
    }

    /// Checks if the note `id` exists by directly querying the database.
    pub(crate) async fn note_exists(&self, id: &'static str) -> bool {
        match db::get_note(&mut self.ex().await, &NoteId::from(id)).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => panic!("{:?}", e),
        }
    }
}
