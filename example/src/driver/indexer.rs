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

//! Background indexing of the hashtags in notes.

use crate::db;
use crate::model::{NoteId, extract_hashtags};
use iii_iv_core::db::{Db, DbError};
use iii_iv_queue::model::{ExecResult, TaskKind};
use iii_iv_tags::driver::TagsDriver;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Request to synchronize the tags of a note with the hashtags in its text.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct IndexNoteTask {
    /// Identifier of the note to index.
    pub(crate) id: NoteId,
}

impl TaskKind for IndexNoteTask {
    const TYPE: &'static str = "index-note";
}

/// Runs `IndexNoteTask`s.
#[derive(Clone)]
pub(crate) struct Indexer {
    /// The database holding the notes.
    db: Arc<dyn Db + Send + Sync>,

    /// Tagging service where the hashtags are recorded.
    tags: TagsDriver,
}

impl Indexer {
    /// Creates a new indexer that reads notes from `db` and records their hashtags in `tags`.
    pub(crate) fn new(db: Arc<dyn Db + Send + Sync>, tags: TagsDriver) -> Self {
        Self { db, tags }
    }

    /// Makes the tags of the note in `task` match the hashtags in its text.  A note that does
    /// not exist any longer loses all of its tags.
    pub(crate) async fn index(self, task: IndexNoteTask) -> ExecResult {
        let entity_id = task.id.as_str();

        let wanted = match db::get_note(&mut self.db.ex().await?, &task.id).await {
            Ok(note) => extract_hashtags(note.text()),
            Err(DbError::NotFound) => {
                debug!("Note {} is gone; dropping its tags", task.id);
                BTreeSet::default()
            }
            Err(e) => return Err(e.into()),
        };
        let current: BTreeSet<String> =
            self.tags.clone().list_tags(entity_id).await?.into_iter().collect();

        let mut added = 0;
        for tag in wanted.difference(&current) {
            self.tags.clone().add_tag(tag, entity_id).await?;
            added += 1;
        }
        let mut removed = 0;
        for tag in current.difference(&wanted) {
            self.tags.clone().remove_tag(tag, entity_id).await?;
            removed += 1;
        }

        Ok(Some(format!("Added {} and removed {} tags", added, removed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use iii_iv_queue::model::TaskStatus;

    #[tokio::test]
    async fn test_index_new_note() {
        let context = TestContext::setup().await;
        context.put_note_directly("n1", "alice", "Buy #milk and #Eggs").await;

        let result = context.indexer().index(IndexNoteTask { id: NoteId::from("n1") }).await;
        assert_eq!(Ok(Some("Added 2 and removed 0 tags".to_owned())), result);

        assert_eq!(vec!["eggs", "milk"], context.tags.clone().list_tags("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_index_updated_note() {
        let context = TestContext::setup().await;
        context.put_note_directly("n1", "alice", "#a #b").await;
        context.indexer().index(IndexNoteTask { id: NoteId::from("n1") }).await.unwrap();

        context.put_note_directly("n1", "alice", "#b #c").await;
        let result = context.indexer().index(IndexNoteTask { id: NoteId::from("n1") }).await;
        assert_eq!(Ok(Some("Added 1 and removed 1 tags".to_owned())), result);

        assert_eq!(vec!["b", "c"], context.tags.clone().list_tags("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_index_missing_note_drops_tags() {
        let context = TestContext::setup().await;
        context.tags.clone().add_tag("stale", "gone").await.unwrap();

        let result = context.indexer().index(IndexNoteTask { id: NoteId::from("gone") }).await;
        assert_eq!(Ok(Some("Added 0 and removed 1 tags".to_owned())), result);

        assert!(context.tags.clone().list_tags("gone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_via_queue() {
        let context = TestContext::setup().await;
        context.put_note_directly("n1", "alice", "#queued").await;

        let id = context.client.enqueue(&IndexNoteTask { id: NoteId::from("n1") }).await.unwrap();
        context.run_tasks().await;

        let task = context.client.get_task(id).await.unwrap();
        assert_eq!(TaskStatus::Completed, task.status);
        assert_eq!(vec!["queued"], context.tags.clone().list_tags("n1").await.unwrap());
    }
}
