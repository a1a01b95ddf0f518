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

//! Business logic to manage tags.

use crate::db;
use iii_iv_core::db::Db;
use iii_iv_core::driver::{DriverError, DriverResult};
use log::debug;
use std::sync::Arc;

/// Fails with `InvalidInput` if `value`, which represents a `what`, is empty.
fn ensure_not_empty(what: &str, value: &str) -> DriverResult<()> {
    if value.is_empty() {
        return Err(DriverError::InvalidInput(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Business logic to manage tags.
#[derive(Clone)]
pub struct TagsDriver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,
}

impl TagsDriver {
    /// Creates a new driver backed by the given injected components.
    pub fn new(db: Arc<dyn Db + Send + Sync>) -> Self {
        Self { db }
    }

    /// Attaches `tag` to `entity_id`.  Attaching an existing tag again is not an error.
    pub async fn add_tag(self, tag: &str, entity_id: &str) -> DriverResult<()> {
        ensure_not_empty("Tag", tag)?;
        ensure_not_empty("Entity id", entity_id)?;
        db::put_tag(&mut self.db.ex().await?, tag, entity_id).await?;
        Ok(())
    }

    /// Detaches `tag` from `entity_id`.  Detaching a tag that was not attached is not an error.
    pub async fn remove_tag(self, tag: &str, entity_id: &str) -> DriverResult<()> {
        ensure_not_empty("Tag", tag)?;
        ensure_not_empty("Entity id", entity_id)?;
        if !db::delete_tag(&mut self.db.ex().await?, tag, entity_id).await? {
            debug!("Tag {} was not attached to {}", tag, entity_id);
        }
        Ok(())
    }

    /// Gets the tags attached to `entity_id`, sorted alphabetically.
    pub async fn list_tags(self, entity_id: &str) -> DriverResult<Vec<String>> {
        let tags = db::get_tags_of(&mut self.db.ex().await?, entity_id).await?;
        Ok(tags)
    }

    /// Checks if `tag` is attached to `entity_id`.
    pub async fn has_tag(self, tag: &str, entity_id: &str) -> DriverResult<bool> {
        let found = db::has_tag(&mut self.db.ex().await?, tag, entity_id).await?;
        Ok(found)
    }

    /// Gets the entities that carry `tag`, sorted alphabetically.
    pub async fn list_entities(self, tag: &str) -> DriverResult<Vec<String>> {
        let entities = db::get_entities_with(&mut self.db.ex().await?, tag).await?;
        Ok(entities)
    }
}
