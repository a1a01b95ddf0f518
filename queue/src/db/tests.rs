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
use serde_json::json;
use std::sync::Arc;
use time::macros::datetime;

/// Maximum runtime used by tests that do not care about lost tasks.
const LONG_RUNTIME: Duration = Duration::from_secs(3600);

async fn test_put_and_get_task(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let created = datetime!(2023-06-11 10:00:00.000100 UTC);
    let only_after = datetime!(2023-06-11 12:00:00.000200 UTC);
    let id1 = put_new_task(&mut ex, "first", &json!({"a": 1}), created, None).await.unwrap();
    let id2 =
        put_new_task(&mut ex, "second", &json!([1, 2]), created, Some(only_after)).await.unwrap();
    assert_ne!(id1, id2);

    let task1 = get_task(&mut ex, id1).await.unwrap();
    assert_eq!(
        Task {
            id: id1,
            task_type: "first".to_owned(),
            payload: json!({"a": 1}),
            status: TaskStatus::Queued,
            error: None,
            result: None,
            runs: 0,
            created,
            updated: created,
            only_after: None,
        },
        task1
    );

    let task2 = get_task(&mut ex, id2).await.unwrap();
    assert_eq!("second", task2.task_type);
    assert_eq!(json!([1, 2]), task2.payload);
    assert_eq!(Some(only_after), task2.only_after);
}

async fn test_get_task_not_found(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();
    assert_eq!(DbError::NotFound, get_task(&mut ex, Uuid::new_v4()).await.unwrap_err());
}

async fn test_claim_task_oldest_first_and_by_type(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let t1 = datetime!(2023-06-11 10:00:00 UTC);
    let t2 = datetime!(2023-06-11 10:00:01 UTC);
    let t3 = datetime!(2023-06-11 10:00:02 UTC);
    let now = datetime!(2023-06-11 11:00:00 UTC);
    let id2 = put_new_task(&mut ex, "mine", &json!(2), t2, None).await.unwrap();
    let id1 = put_new_task(&mut ex, "mine", &json!(1), t1, None).await.unwrap();
    put_new_task(&mut ex, "other", &json!(0), t3, None).await.unwrap();

    let task = claim_task(&mut ex, "mine", LONG_RUNTIME, now).await.unwrap().unwrap();
    assert_eq!(id1, task.id);
    assert_eq!(TaskStatus::Processing, task.status);
    assert_eq!(1, task.runs);
    assert_eq!(now, task.updated);

    let task = claim_task(&mut ex, "mine", LONG_RUNTIME, now).await.unwrap().unwrap();
    assert_eq!(id2, task.id);

    assert!(claim_task(&mut ex, "mine", LONG_RUNTIME, now).await.unwrap().is_none());
    assert!(claim_task(&mut ex, "unknown", LONG_RUNTIME, now).await.unwrap().is_none());
}

async fn test_claim_task_respects_only_after(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let created = datetime!(2023-06-11 10:00:00 UTC);
    let only_after = datetime!(2023-06-11 10:30:00.000500 UTC);
    let id = put_new_task(&mut ex, "t", &json!(null), created, Some(only_after)).await.unwrap();

    for now in [created, datetime!(2023-06-11 10:30:00.000499 UTC)] {
        assert!(claim_task(&mut ex, "t", LONG_RUNTIME, now).await.unwrap().is_none());
    }

    let task = claim_task(&mut ex, "t", LONG_RUNTIME, only_after).await.unwrap().unwrap();
    assert_eq!(id, task.id);
}

async fn test_claim_task_reclaims_lost_tasks(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let created = datetime!(2023-06-11 10:00:00 UTC);
    let max_runtime = Duration::from_secs(60);
    let id = put_new_task(&mut ex, "t", &json!(null), created, None).await.unwrap();

    let task = claim_task(&mut ex, "t", max_runtime, created).await.unwrap().unwrap();
    assert_eq!(1, task.runs);

    // Still within its allowed runtime.
    let now = datetime!(2023-06-11 10:01:00 UTC);
    assert!(claim_task(&mut ex, "t", max_runtime, now).await.unwrap().is_none());

    let now = datetime!(2023-06-11 10:01:00.000001 UTC);
    let task = claim_task(&mut ex, "t", max_runtime, now).await.unwrap().unwrap();
    assert_eq!(id, task.id);
    assert_eq!(2, task.runs);
    assert_eq!(now, task.updated);
}

async fn test_finish_task(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let created = datetime!(2023-06-11 10:00:00 UTC);
    let done = datetime!(2023-06-11 10:00:05 UTC);
    let id1 = put_new_task(&mut ex, "t", &json!(1), created, None).await.unwrap();
    let id2 = put_new_task(&mut ex, "t", &json!(2), created, None).await.unwrap();
    claim_task(&mut ex, "t", LONG_RUNTIME, created).await.unwrap().unwrap();
    claim_task(&mut ex, "t", LONG_RUNTIME, created).await.unwrap().unwrap();

    finish_task(&mut ex, id1, TaskStatus::Completed, None, Some("all good"), done).await.unwrap();
    finish_task(&mut ex, id2, TaskStatus::Failed, Some("broken"), None, done).await.unwrap();

    let task1 = get_task(&mut ex, id1).await.unwrap();
    assert_eq!(TaskStatus::Completed, task1.status);
    assert_eq!(None, task1.error);
    assert_eq!(Some("all good".to_owned()), task1.result);
    assert_eq!(done, task1.updated);

    let task2 = get_task(&mut ex, id2).await.unwrap();
    assert_eq!(TaskStatus::Failed, task2.status);
    assert_eq!(Some("broken".to_owned()), task2.error);
    assert_eq!(None, task2.result);

    // Finished tasks are never claimed again.
    let later = datetime!(2023-06-12 10:00:00 UTC);
    assert!(claim_task(&mut ex, "t", Duration::from_secs(1), later).await.unwrap().is_none());
}

async fn test_finish_task_requires_processing(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let now = datetime!(2023-06-11 10:00:00 UTC);
    let id = put_new_task(&mut ex, "t", &json!(1), now, None).await.unwrap();

    match finish_task(&mut ex, id, TaskStatus::Completed, None, None, now).await.unwrap_err() {
        DbError::BackendError(e) => assert!(e.contains("is not processing (status QUEUED)")),
        e => panic!("Unexpected error {:?}", e),
    }

    claim_task(&mut ex, "t", LONG_RUNTIME, now).await.unwrap().unwrap();
    match finish_task(&mut ex, id, TaskStatus::Queued, None, None, now).await.unwrap_err() {
        DbError::BackendError(e) => assert!(e.contains("Invalid final status QUEUED")),
        e => panic!("Unexpected error {:?}", e),
    }
    finish_task(&mut ex, id, TaskStatus::Completed, None, None, now).await.unwrap();

    match finish_task(&mut ex, id, TaskStatus::Failed, None, None, now).await.unwrap_err() {
        DbError::BackendError(e) => assert!(e.contains("is not processing (status COMPLETED)")),
        e => panic!("Unexpected error {:?}", e),
    }

    assert_eq!(
        DbError::NotFound,
        finish_task(&mut ex, Uuid::new_v4(), TaskStatus::Failed, None, None, now)
            .await
            .unwrap_err()
    );
}

async fn test_requeue_task(db: Arc<dyn Db + Send + Sync>) {
    let mut ex = db.ex().await.unwrap();

    let created = datetime!(2023-06-11 10:00:00 UTC);
    let retry_at = datetime!(2023-06-11 10:05:00 UTC);
    let id = put_new_task(&mut ex, "t", &json!(1), created, None).await.unwrap();
    claim_task(&mut ex, "t", LONG_RUNTIME, created).await.unwrap().unwrap();

    requeue_task(&mut ex, id, retry_at, "try later", created).await.unwrap();
    let task = get_task(&mut ex, id).await.unwrap();
    assert_eq!(TaskStatus::Queued, task.status);
    assert_eq!(Some("try later".to_owned()), task.error);
    assert_eq!(Some(retry_at), task.only_after);
    assert_eq!(1, task.runs);

    match requeue_task(&mut ex, id, retry_at, "again", created).await.unwrap_err() {
        DbError::BackendError(e) => assert!(e.contains("is not processing")),
        e => panic!("Unexpected error {:?}", e),
    }

    assert!(claim_task(&mut ex, "t", LONG_RUNTIME, created).await.unwrap().is_none());
    let task = claim_task(&mut ex, "t", LONG_RUNTIME, retry_at).await.unwrap().unwrap();
    assert_eq!(2, task.runs);
}

macro_rules! generate_db_tests [
    ( $setup:expr $(, #[$extra:meta] )? ) => {
        iii_iv_core::db::testutils::generate_tests!(
            $(#[$extra],)?
            $setup,
            $crate::db::tests,
            test_put_and_get_task,
            test_get_task_not_found,
            test_claim_task_oldest_first_and_by_type,
            test_claim_task_respects_only_after,
            test_claim_task_reclaims_lost_tasks,
            test_finish_task,
            test_finish_task_requires_processing,
            test_requeue_task
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
