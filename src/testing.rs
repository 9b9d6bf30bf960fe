//! In-process test doubles
//!
//! Provides an in-memory store, a recording messenger and a scripted language
//! model so the service can be exercised without Redis or network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::gemini::{Generation, LanguageModel};
use crate::phone::PhoneNumber;
use crate::queue::{queue_position, Placement, QueueEntry, QueueStatus, QueueStore};
use crate::upstream::UpstreamError;
use crate::whatsapp::{DeliveryReceipt, MessageRecord, MessageStore, Messenger, OutboundContent};

/// Queue entries and message history held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<QueueEntry>>,
    messages: Mutex<HashMap<PhoneNumber, Vec<MessageRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, entry: &QueueEntry) -> AppResult<u32> {
        let mut entries = self.entries.lock().await;
        let taken = entries
            .iter()
            .any(|e| e.status == QueueStatus::Active && e.phone_number == entry.phone_number);
        if taken {
            return Err(AppError::DuplicateEntry(entry.phone_number.to_string()));
        }
        entries.push(entry.clone());
        queue_position(entries.iter(), &entry.id)
            .ok_or_else(|| AppError::Internal("inserted entry is not active".to_string()))
    }

    async fn fetch(&self, id: &Uuid) -> AppResult<Option<Placement>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.id == *id).map(|entry| Placement {
            entry: entry.clone(),
            position: queue_position(entries.iter(), id),
        }))
    }

    async fn update_status(&self, entry: &QueueEntry, expected: QueueStatus) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let stored = entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| AppError::EntryNotFound(entry.id.to_string()))?;
        if stored.status != expected {
            return Err(AppError::InvalidTransition {
                from: stored.status,
                to: entry.status,
            });
        }
        *stored = entry.clone();
        Ok(())
    }

    async fn len(&self) -> AppResult<u64> {
        Ok(self.entries.lock().await.len() as u64)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn record(&self, record: &MessageRecord) -> AppResult<()> {
        let mut messages = self.messages.lock().await;
        messages
            .entry(record.phone_number.clone())
            .or_default()
            .insert(0, record.clone());
        Ok(())
    }

    async fn history(&self, phone: &PhoneNumber) -> AppResult<Vec<MessageRecord>> {
        Ok(self
            .messages
            .lock()
            .await
            .get(phone)
            .cloned()
            .unwrap_or_default())
    }
}

/// Messenger that records every send and answers with a fixed outcome.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(PhoneNumber, OutboundContent)>>,
    failure: Option<UpstreamError>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(failure: UpstreamError) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<(PhoneNumber, OutboundContent)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(
        &self,
        to: &PhoneNumber,
        content: &OutboundContent,
    ) -> Result<DeliveryReceipt, UpstreamError> {
        let mut sent = self.sent.lock().await;
        sent.push((to.clone(), content.clone()));
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(DeliveryReceipt {
            message_id: format!("msg-{}", sent.len()),
            status: "sent".to_string(),
            to: to.clone(),
        })
    }
}

/// Language model returning a canned reply and counting its calls.
#[derive(Debug)]
pub struct ScriptedModel {
    reply: Result<Generation, UpstreamError>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn replying(text: &str, tokens_used: Option<u32>) -> Self {
        Self {
            reply: Ok(Generation {
                text: text.to_string(),
                tokens_used,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: UpstreamError) -> Self {
        Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}
