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

//! Common tests for any database implementation.

use crate::db::*;
use iii_iv_core::db::Db;
use std::sync::Arc;

async fn test_put_tag_is_idempotent(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    put_tag(&mut ex, "red", "e1").await.unwrap();
    put_tag(&mut ex, "red", "e1").await.unwrap();

    assert_eq!(vec!["red".to_owned()], get_tags_of(&mut ex, "e1").await.unwrap());
}

async fn test_delete_tag(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    put_tag(&mut ex, "red", "e1").await.unwrap();
    put_tag(&mut ex, "blue", "e1").await.unwrap();

    assert!(delete_tag(&mut ex, "red", "e1").await.unwrap());
    assert!(!delete_tag(&mut ex, "red", "e1").await.unwrap());
    assert!(!delete_tag(&mut ex, "blue", "e2").await.unwrap());

    assert_eq!(vec!["blue".to_owned()], get_tags_of(&mut ex, "e1").await.unwrap());
}

async fn test_get_tags_of_sorted(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    put_tag(&mut ex, "c", "e1").await.unwrap();
    put_tag(&mut ex, "a", "e1").await.unwrap();
    put_tag(&mut ex, "b", "e1").await.unwrap();
    put_tag(&mut ex, "d", "e2").await.unwrap();

    assert_eq!(vec!["a", "b", "c"], get_tags_of(&mut ex, "e1").await.unwrap());
    assert!(get_tags_of(&mut ex, "e3").await.unwrap().is_empty());
}

async fn test_get_entities_with_sorted(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    put_tag(&mut ex, "red", "e3").await.unwrap();
    put_tag(&mut ex, "red", "e1").await.unwrap();
    put_tag(&mut ex, "blue", "e2").await.unwrap();

    assert_eq!(vec!["e1", "e3"], get_entities_with(&mut ex, "red").await.unwrap());
    assert!(get_entities_with(&mut ex, "green").await.unwrap().is_empty());
}

async fn test_has_tag(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    put_tag(&mut ex, "red", "e1").await.unwrap();

    assert!(has_tag(&mut ex, "red", "e1").await.unwrap());
    assert!(!has_tag(&mut ex, "red", "e2").await.unwrap());
    assert!(!has_tag(&mut ex, "blue", "e1").await.unwrap());
}

macro_rules! generate_db_tests [
    ( $setup:expr $(, #[$extra:meta] )? ) => {
        iii_iv_core::db::testutils::generate_tests!(
            $(#[$extra],)?
            $setup,
            $crate::db::tests,
            test_put_tag_is_idempotent,
            test_delete_tag,
            test_get_tags_of_sorted,
            test_get_entities_with_sorted,
            test_has_tag
        );
    }
];

use generate_db_tests;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::db::init_schema;

    async fn setup() -> Arc<dyn Db + Send + Sync> {
        let db = iii_iv_core::db::postgres::testutils::setup().await;
        init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        Arc::new(db)
    }

    generate_db_tests!(
        setup().await,
        #[ignore = "Requires environment configuration and is expensive"]
    );
}

mod sqlite {
    use super::*;
    use crate::db::init_schema;

    async fn setup() -> Arc<dyn Db + Send + Sync> {
        let db = iii_iv_core::db::sqlite::testutils::setup().await;
        init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        Arc::new(db)
    }

    generate_db_tests!(setup().await);
}
