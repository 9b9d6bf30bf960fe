use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::phone::PhoneNumber;
use crate::queue::{Placement, QueueEntry, QueueStatus, QueueStore};
use crate::whatsapp::{MessageRecord, MessageStore};

/// Most recent messages kept per phone number.
const HISTORY_LIMIT: isize = 1000;

/// Checks the phone claim, writes the entry, indexes it and returns its rank,
/// all in one atomic step. Returns -1 when the phone is already queued.
///
/// The score never falls below the newest active score, so an entry stamped
/// before a concurrent one but inserted after it still ranks last.
///
/// KEYS: entry, active set, phone hash, all set
/// ARGV: entry json, id, phone, score
const ENQUEUE_LUA: &str = r#"
if redis.call('HEXISTS', KEYS[3], ARGV[3]) == 1 then
  return -1
end
local score = tonumber(ARGV[4])
local newest = redis.call('ZREVRANGE', KEYS[2], 0, 0, 'WITHSCORES')
if newest[2] and tonumber(newest[2]) >= score then
  score = tonumber(newest[2]) + 1
end
score = string.format('%.0f', score)
redis.call('SET', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], score, ARGV[2])
redis.call('HSET', KEYS[3], ARGV[3], ARGV[2])
redis.call('ZADD', KEYS[4], score, ARGV[2])
return redis.call('ZRANK', KEYS[2], ARGV[2]) + 1
"#;

/// Writes a status change only if the stored status is still the expected
/// one. Leaving `active` drops the entry from the ordering and releases the
/// phone, unless the phone already belongs to a newer entry.
///
/// Returns `ok`, `missing`, or the stored status when it did not match.
///
/// KEYS: entry, active set, phone hash
/// ARGV: entry json, id, phone, expected status, new status
const UPDATE_STATUS_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return 'missing'
end
local status = cjson.decode(current)['status']
if status ~= ARGV[4] then
  return status
end
redis.call('SET', KEYS[1], ARGV[1])
if ARGV[5] ~= 'active' then
  redis.call('ZREM', KEYS[2], ARGV[2])
  if redis.call('HGET', KEYS[3], ARGV[3]) == ARGV[2] then
    redis.call('HDEL', KEYS[3], ARGV[3])
  end
end
return 'ok'
"#;

static ENQUEUE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(ENQUEUE_LUA));
static UPDATE_STATUS_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(UPDATE_STATUS_LUA));

/// Redis-backed persistence for queue entries and message history.
///
/// Layout under the key prefix `p`:
/// * `p:waiting_list:entry:<id>` - entry JSON
/// * `p:waiting_list:active` - active ids scored by creation time in µs,
///   bumped past the newest score when inserts race
/// * `p:waiting_list:all` - every id ever stored
/// * `p:waiting_list:phones` - phone -> id of its active entry
/// * `p:whatsapp:messages:<phone>` - message JSON, newest first
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL
    /// * `prefix` - Namespace for every key written by the store
    pub async fn connect(url: &str, prefix: &str) -> AppResult<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    /// Gets a handle on the shared multiplexed connection.
    pub fn get_connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    fn entry_key(&self, id: &Uuid) -> String {
        format!("{}:waiting_list:entry:{}", self.prefix, id)
    }

    fn active_key(&self) -> String {
        format!("{}:waiting_list:active", self.prefix)
    }

    fn all_key(&self) -> String {
        format!("{}:waiting_list:all", self.prefix)
    }

    fn phones_key(&self) -> String {
        format!("{}:waiting_list:phones", self.prefix)
    }

    fn history_key(&self, phone: &PhoneNumber) -> String {
        format!("{}:whatsapp:messages:{}", self.prefix, phone)
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn insert(&self, entry: &QueueEntry) -> AppResult<u32> {
        let mut conn = self.get_connection();
        let entry_json = serde_json::to_string(entry)?;
        let score = entry.created_at.timestamp_micros();

        let position: i64 = ENQUEUE_SCRIPT
            .key(self.entry_key(&entry.id))
            .key(self.active_key())
            .key(self.phones_key())
            .key(self.all_key())
            .arg(entry_json)
            .arg(entry.id.to_string())
            .arg(entry.phone_number.as_str())
            .arg(score)
            .invoke_async(&mut conn)
            .await?;

        u32::try_from(position)
            .map_err(|_| AppError::DuplicateEntry(entry.phone_number.to_string()))
    }

    async fn fetch(&self, id: &Uuid) -> AppResult<Option<Placement>> {
        let mut conn = self.get_connection();
        let entry_json: Option<String> = conn.get(self.entry_key(id)).await?;
        let Some(json) = entry_json else {
            return Ok(None);
        };
        let entry: QueueEntry = serde_json::from_str(&json)?;

        let position = if entry.status == QueueStatus::Active {
            let rank: Option<u64> = conn.zrank(self.active_key(), id.to_string()).await?;
            rank.map(|r| r as u32 + 1)
        } else {
            None
        };
        Ok(Some(Placement { entry, position }))
    }

    async fn update_status(&self, entry: &QueueEntry, expected: QueueStatus) -> AppResult<()> {
        let mut conn = self.get_connection();
        let entry_json = serde_json::to_string(entry)?;

        let outcome: String = UPDATE_STATUS_SCRIPT
            .key(self.entry_key(&entry.id))
            .key(self.active_key())
            .key(self.phones_key())
            .arg(entry_json)
            .arg(entry.id.to_string())
            .arg(entry.phone_number.as_str())
            .arg(expected.to_string())
            .arg(entry.status.to_string())
            .invoke_async(&mut conn)
            .await?;

        match outcome.as_str() {
            "ok" => Ok(()),
            "missing" => Err(AppError::EntryNotFound(entry.id.to_string())),
            stored => {
                let from = stored.parse::<QueueStatus>().map_err(|_| {
                    AppError::Internal(format!("unknown stored status '{stored}'"))
                })?;
                Err(AppError::InvalidTransition {
                    from,
                    to: entry.status,
                })
            }
        }
    }

    async fn len(&self) -> AppResult<u64> {
        let mut conn = self.get_connection();
        Ok(conn.zcard(self.all_key()).await?)
    }
}

#[async_trait]
impl MessageStore for RedisStore {
    async fn record(&self, record: &MessageRecord) -> AppResult<()> {
        let mut conn = self.get_connection();
        let key = self.history_key(&record.phone_number);
        let record_json = serde_json::to_string(record)?;

        redis::pipe()
            .atomic()
            .lpush(&key, record_json)
            .ignore()
            .ltrim(&key, 0, HISTORY_LIMIT - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn history(&self, phone: &PhoneNumber) -> AppResult<Vec<MessageRecord>> {
        let mut conn = self.get_connection();
        let raw: Vec<String> = conn.lrange(self.history_key(phone), 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(AppError::from))
            .collect()
    }
}
