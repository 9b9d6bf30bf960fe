//! Redis store tests
//!
//! Require a running Redis; run with
//! `REDIS_URL=redis://127.0.0.1/ cargo test --test test_redis_store -- --ignored`.

use aisha_backend::phone::NumberingPlan;
use aisha_backend::queue::{QueueEntry, QueueStatus, QueueStore, WaitingList};
use aisha_backend::store::RedisStore;
use aisha_backend::error::AppError;
use aisha_backend::whatsapp::{
    DeliveryReceipt, Direction, MessageRecord, MessageStore, OutboundContent,
};
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    // Fresh namespace per test so runs never see each other's keys.
    let prefix = format!("aisha-test-{}", Uuid::new_v4());
    RedisStore::connect(&url, &prefix).await.unwrap()
}

#[tokio::test]
#[ignore] // Requires Redis
async fn enqueue_assigns_positions_and_guards_phones() {
    let store = Arc::new(store().await);
    let list = WaitingList::new(store.clone(), NumberingPlan::kenya());

    let first = list.enqueue("John Doe", "0712345678").await.unwrap();
    let second = list.enqueue("Jane Doe", "0722000000").await.unwrap();
    assert_eq!(first.position, Some(1));
    assert_eq!(second.position, Some(2));

    let err = list.enqueue("Johnny", "+254712345678").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateEntry(_)));
    assert_eq!(list.len().await.unwrap(), 2);

    let fetched = list.get_by_id(&second.entry.id.to_string()).await.unwrap();
    assert_eq!(fetched.entry, second.entry);
    assert_eq!(fetched.position, Some(2));
}

#[tokio::test]
#[ignore] // Requires Redis
async fn served_entries_leave_the_ordering() {
    let store = Arc::new(store().await);
    let list = WaitingList::new(store.clone(), NumberingPlan::kenya());

    let first = list.enqueue("John Doe", "0712345678").await.unwrap();
    let second = list.enqueue("Jane Doe", "0722000000").await.unwrap();

    let served = list
        .update_status(&first.entry.id.to_string(), QueueStatus::Served)
        .await
        .unwrap();
    assert_eq!(served.status, QueueStatus::Served);

    let first_now = store.fetch(&first.entry.id).await.unwrap().unwrap();
    assert_eq!(first_now.position, None);
    let second_now = store.fetch(&second.entry.id).await.unwrap().unwrap();
    assert_eq!(second_now.position, Some(1));

    // The phone is free again once its entry is served.
    let again = list.enqueue("John Doe", "0712345678").await.unwrap();
    assert_eq!(again.position, Some(2));
}

#[tokio::test]
#[ignore] // Requires Redis
async fn stale_status_change_keeps_the_new_claim() {
    let store = Arc::new(store().await);
    let list = WaitingList::new(store.clone(), NumberingPlan::kenya());

    let first = list.enqueue("John Doe", "0712345678").await.unwrap();
    list.update_status(&first.entry.id.to_string(), QueueStatus::Cancelled)
        .await
        .unwrap();
    let again = list.enqueue("John Doe", "0712345678").await.unwrap();

    // A change computed before the cancellation arrives late.
    let mut stale = first.entry.clone();
    stale.status = QueueStatus::Served;
    let err = store
        .update_status(&stale, QueueStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: QueueStatus::Cancelled,
            to: QueueStatus::Served
        }
    ));

    // The re-queued entry still holds the phone.
    let err = list.enqueue("Johnny", "+254712345678").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateEntry(_)));
    let current = store.fetch(&again.entry.id).await.unwrap().unwrap();
    assert_eq!(current.position, Some(1));
}

#[tokio::test]
#[ignore] // Requires Redis
async fn concurrent_enqueues_get_distinct_positions() {
    let store = Arc::new(store().await);
    let list = WaitingList::new(store, NumberingPlan::kenya());

    let (a, b, c) = tokio::join!(
        list.enqueue("Amina", "0711000001"),
        list.enqueue("Baraka", "0711000002"),
        list.enqueue("Chebet", "0711000003"),
    );
    let mut positions: Vec<u32> = [a, b, c]
        .into_iter()
        .map(|placement| placement.unwrap().position.unwrap())
        .collect();
    positions.sort();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn unknown_ids_are_absent() {
    let store = store().await;
    let entry = QueueEntry::new(
        "Nobody".to_string(),
        NumberingPlan::kenya().normalize("0700000000").unwrap(),
    );
    assert!(store.fetch(&entry.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn history_is_newest_first() {
    let store = store().await;
    let phone = NumberingPlan::kenya().normalize("0712345678").unwrap();

    for n in 1..=3 {
        let receipt = DeliveryReceipt {
            message_id: format!("m-{n}"),
            status: "sent".to_string(),
            to: phone.clone(),
        };
        let content = OutboundContent::Text {
            body: format!("message {n}"),
        };
        store
            .record(&MessageRecord::outbound(&content, &receipt))
            .await
            .unwrap();
    }

    let history = store.history(&phone).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["message 3", "message 2", "message 1"]);
    assert!(history.iter().all(|r| r.direction == Direction::Outbound));
}
