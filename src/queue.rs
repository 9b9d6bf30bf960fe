use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::phone::{NumberingPlan, PhoneNumber};

static DISPLAY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}\s'-]{2,50}$").expect("display name pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Active,
    Served,
    Cancelled,
}

serde_plain::derive_display_from_serialize!(QueueStatus);
serde_plain::derive_fromstr_from_deserialize!(QueueStatus);

impl QueueStatus {
    /// Only active entries can change status, and only to a terminal one.
    pub fn transition(self, to: QueueStatus) -> AppResult<QueueStatus> {
        match (self, to) {
            (QueueStatus::Active, QueueStatus::Served | QueueStatus::Cancelled) => Ok(to),
            (from, to) => Err(AppError::InvalidTransition { from, to }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: Uuid,
    pub display_name: String,
    pub phone_number: PhoneNumber,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Creates a new active entry stamped with the current time.
    ///
    /// The timestamp is truncated to microseconds so that every store orders
    /// entries identically.
    pub fn new(display_name: String, phone_number: PhoneNumber) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            phone_number,
            status: QueueStatus::Active,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "QueueEntry"),
        }
    }
}

/// An entry together with its position at read time.
///
/// `position` is `None` once the entry is no longer active.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub entry: QueueEntry,
    pub position: Option<u32>,
}

/// 1-based position of `id` among the active entries of `entries`, ordered by
/// creation time with the id as tie-breaker.
pub fn queue_position<'a, I>(entries: I, id: &Uuid) -> Option<u32>
where
    I: IntoIterator<Item = &'a QueueEntry>,
{
    let mut active: Vec<(DateTime<Utc>, Uuid)> = entries
        .into_iter()
        .filter(|entry| entry.status == QueueStatus::Active)
        .map(|entry| (entry.created_at, entry.id))
        .collect();
    active.sort();
    active
        .iter()
        .position(|(_, candidate)| candidate == id)
        .map(|index| index as u32 + 1)
}

pub fn validate_display_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if !DISPLAY_NAME.is_match(name) || !name.chars().any(char::is_alphabetic) {
        return Err(AppError::Validation(
            "displayName must be 2-50 characters of letters, spaces, hyphens or apostrophes"
                .to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Persistence for waiting list entries.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Stores a new active entry and returns its position.
    ///
    /// Fails with [`AppError::DuplicateEntry`] without writing anything when the
    /// phone number already has an active entry.
    async fn insert(&self, entry: &QueueEntry) -> AppResult<u32>;

    async fn fetch(&self, id: &Uuid) -> AppResult<Option<Placement>>;

    /// Persists a status change if the stored status is still `expected`.
    ///
    /// Entries that are no longer active leave the ordering and release their
    /// phone number. When another change got there first this fails with
    /// [`AppError::InvalidTransition`] from the stored status and writes nothing.
    async fn update_status(&self, entry: &QueueEntry, expected: QueueStatus) -> AppResult<()>;

    /// Number of entries ever stored, whatever their status.
    async fn len(&self) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct WaitingList {
    store: Arc<dyn QueueStore>,
    plan: NumberingPlan,
}

impl WaitingList {
    pub fn new(store: Arc<dyn QueueStore>, plan: NumberingPlan) -> Self {
        Self { store, plan }
    }

    pub fn plan(&self) -> &NumberingPlan {
        &self.plan
    }

    /// Adds a customer to the waiting list.
    ///
    /// # Arguments
    /// * `display_name` - Name shown for the entry
    /// * `raw_phone` - Phone number in local, country-code or international form
    ///
    /// # Returns
    /// * `AppResult<Placement>` - The stored entry and its position
    pub async fn enqueue(&self, display_name: &str, raw_phone: &str) -> AppResult<Placement> {
        let display_name = validate_display_name(display_name)?;
        let phone_number = self
            .plan
            .normalize(raw_phone)
            .map_err(|e| AppError::InvalidPhoneNumber(e.to_string()))?;

        let entry = QueueEntry::new(display_name, phone_number);
        let position = self.store.insert(&entry).await?;
        info!(id = %entry.id, position, "added entry to waiting list");

        Ok(Placement {
            entry,
            position: Some(position),
        })
    }

    /// Looks an entry up by id; anything that is not a known UUID is not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Placement> {
        let uuid = Uuid::parse_str(id).map_err(|_| AppError::EntryNotFound(id.to_string()))?;
        let placement = self
            .store
            .fetch(&uuid)
            .await?
            .ok_or_else(|| AppError::EntryNotFound(id.to_string()))?;
        debug!(id = %uuid, position = ?placement.position, "fetched waiting list entry");
        Ok(placement)
    }

    pub async fn update_status(&self, id: &str, status: QueueStatus) -> AppResult<QueueEntry> {
        let Placement { mut entry, .. } = self.get_by_id(id).await?;
        let current = entry.status;
        entry.status = current.transition(status)?;
        self.store.update_status(&entry, current).await?;
        info!(id = %entry.id, status = %entry.status, "updated waiting list entry");
        Ok(entry)
    }

    pub async fn len(&self) -> AppResult<u64> {
        self.store.len().await
    }
}
