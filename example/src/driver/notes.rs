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

//! Operations on notes.

use crate::db;
use crate::driver::{Driver, IndexNoteTask};
use crate::model::{Note, NoteId};
use iii_iv_acl::model::{Action, Grantee, Resource};
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::Username;
use log::{debug, info, warn};

/// Computes the name of the resource that protects the note `id`.
fn note_resource(id: &NoteId) -> DriverResult<Resource> {
    Ok(Resource::new(format!("notes/{}", id))?)
}

impl Driver {
    /// Revokes `action` on `resource` from `grantee` if it was given.
    async fn revoke_if_given(
        &self,
        grantee: &Grantee,
        resource: &Resource,
        action: Action,
    ) -> DriverResult<()> {
        match self.acl.clone().revoke_permission(grantee.clone(), resource.clone(), action).await {
            Ok(()) | Err(DriverError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Creates or updates the note `id` on behalf of `user` with the given `text`.
    ///
    /// Creating a note makes `user` its owner and grants them READ and WRITE on it.  Only the
    /// caller whose insert wins gets those grants, so concurrent creations of the same `id` leave
    /// exactly one owner.  Updating a note requires WRITE and keeps its owner.  Either way, the
    /// note is queued for reindexing.
    ///
    /// Returns the stored note and whether it was created.
    pub(crate) async fn put_note(
        self,
        user: &Username,
        id: NoteId,
        text: String,
    ) -> DriverResult<(Note, bool)> {
        let grantee = Grantee::from(user);
        let resource = note_resource(&id)?;

        let now = self.clock.now_utc();
        let candidate = Note::new(id, user.clone(), text, now)?;
        let created = db::create_note(&mut self.db.ex().await?, &candidate).await?;

        let note = if created {
            info!("User {} created note {}", user, candidate.id());
            let acl = self.acl.clone();
            acl.give_permission(grantee.clone(), resource.clone(), Action::Read).await?;
            self.acl.clone().give_permission(grantee, resource, Action::Write).await?;
            candidate
        } else {
            self.acl.clone().require_permission(&grantee, &resource, Action::Write).await?;

            let mut ex = self.db.ex().await?;
            db::update_note_text(&mut ex, candidate.id(), candidate.text(), now).await?;
            db::get_note(&mut ex, candidate.id()).await?
        };

        let task_id = self.queue.enqueue(&IndexNoteTask { id: note.id().clone() }).await?;
        debug!("Enqueued task {} to index note {}", task_id, note.id());

        Ok((note, created))
    }

    /// Gets the note `id` on behalf of `user`, who needs READ on it.
    pub(crate) async fn get_note(self, user: &Username, id: &NoteId) -> DriverResult<Note> {
        let resource = note_resource(id)?;
        self.acl.clone().require_permission(&Grantee::from(user), &resource, Action::Read).await?;

        let note = db::get_note(&mut self.db.ex().await?, id).await?;
        Ok(note)
    }

    /// Gets the tags that the indexer attached to the note `id`.  The caller must have checked
    /// access to the note already.
    pub(crate) async fn get_note_tags(self, id: &NoteId) -> DriverResult<Vec<String>> {
        self.tags.list_tags(id.as_str()).await
    }

    /// Deletes the note `id` on behalf of `user`, who needs WRITE on it.
    ///
    /// The tags of the note and the permissions of its owner and of `user` on it are removed too.
    pub(crate) async fn delete_note(self, user: &Username, id: &NoteId) -> DriverResult<()> {
        let grantee = Grantee::from(user);
        let resource = note_resource(id)?;
        self.acl.clone().require_permission(&grantee, &resource, Action::Write).await?;

        let note = db::get_note(&mut self.db.ex().await?, id).await?;
        db::delete_note(&mut self.db.ex().await?, id).await?;
        info!("User {} deleted note {}", user, id);

        for tag in self.tags.clone().list_tags(id.as_str()).await? {
            self.tags.clone().remove_tag(&tag, id.as_str()).await?;
        }

        let owner = Grantee::from(note.owner());
        for action in [Action::Read, Action::Write] {
            self.revoke_if_given(&owner, &resource, action).await?;
            if owner != grantee {
                self.revoke_if_given(&grantee, &resource, action).await?;
            }
        }

        Ok(())
    }

    /// Gets the notes that carry `tag` and that `user` can read, sorted by identifier.
    pub(crate) async fn list_notes_with_tag(
        self,
        user: &Username,
        tag: &str,
    ) -> DriverResult<Vec<Note>> {
        let tag = tag.to_lowercase();
        if tag.is_empty() {
            return Err(DriverError::InvalidInput("Tag cannot be empty".to_owned()));
        }
        let grantee = Grantee::from(user);

        let mut notes = vec![];
        for entity_id in self.tags.clone().list_entities(&tag).await? {
            let id = match NoteId::new(entity_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Ignoring invalid note id attached to tag {}: {}", tag, e);
                    continue;
                }
            };

            let resource = note_resource(&id)?;
            if !self.acl.clone().has_permission(&grantee, &resource, Action::Read).await? {
                continue;
            }

            // The index lags behind deletions until the indexer catches up.
            match db::get_note(&mut self.db.ex().await?, &id).await {
                Ok(note) => notes.push(note),
                Err(DbError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(notes)
    }
}
