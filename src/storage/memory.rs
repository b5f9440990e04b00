//! In-memory implementation of `KvStore`.
//!
//! Mirrors the Redis semantics the queue relies on so engine logic can be
//! tested without a server. Sets iterate in sorted order, which keeps pool
//! selection deterministic in tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KvStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Entry {
    Str {
        value: String,
        expires_at: Option<Instant>,
    },
    List(VecDeque<String>),
    Hash(HashMap<String, Vec<u8>>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Entry::Str { expires_at: Some(at), .. } if *at <= now)
    }
}

/// Process-local store. Cloning is not supported; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.get(key).is_some_and(|e| !e.is_expired(now))
    }
}

fn wrong_type(key: &str, operation: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        operation,
    }
}

/// Drops `key` if it has expired so callers see it as missing.
fn evict_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries
        .get(key)
        .is_some_and(|e| e.is_expired(Instant::now()))
    {
        entries.remove(key);
    }
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    operation: &'static str,
) -> Result<&'a mut VecDeque<String>, StoreError> {
    match entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::List(VecDeque::new()))
    {
        Entry::List(list) => Ok(list),
        _ => Err(wrong_type(key, operation)),
    }
}

/// Removes a list that became empty, as Redis does.
fn drop_if_empty_list(entries: &mut HashMap<String, Entry>, key: &str) {
    if matches!(entries.get(key), Some(Entry::List(l)) if l.is_empty()) {
        entries.remove(key);
    }
}

fn pop(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    front: bool,
    operation: &'static str,
) -> Result<Option<String>, StoreError> {
    let popped = match entries.get_mut(key) {
        None => return Ok(None),
        Some(Entry::List(list)) => {
            if front {
                list.pop_front()
            } else {
                list.pop_back()
            }
        }
        Some(_) => return Err(wrong_type(key, operation)),
    };
    drop_if_empty_list(entries, key);
    Ok(popped)
}

/// Resolves a Redis-style index (negative counts from the end) against `len`.
fn resolve_index(index: isize, len: usize) -> isize {
    if index < 0 {
        len as isize + index
    } else {
        index
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry::Str {
            value: "0".to_string(),
            expires_at: None,
        });
        match entry {
            Entry::Str { value, .. } => {
                let current: u64 = value.parse().map_err(|_| wrong_type(key, "INCR"))?;
                let next = current.checked_add(1).ok_or_else(|| StoreError::Overflow {
                    key: key.to_string(),
                })?;
                *value = next.to_string();
                Ok(next)
            }
            _ => Err(wrong_type(key, "INCR")),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let list = list_mut(&mut entries, key, "RPUSH")?;
        list.push_back(value.to_string());
        Ok(list.len())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let list = list_mut(&mut entries, key, "LPUSH")?;
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        pop(&mut entries, key, true, "LPOP")
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        pop(&mut entries, key, false, "RPOP")
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key, "LLEN")),
        }
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().await;
        let list = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(list)) => list,
            Some(_) => return Err(wrong_type(key, "LRANGE")),
        };

        let len = list.len();
        let start = resolve_index(start, len).max(0);
        let stop = resolve_index(stop, len).min(len as isize - 1);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(hash) => {
                hash.insert(field.to_string(), value.to_vec());
                Ok(())
            }
            _ => Err(wrong_type(key, "HSET")),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key, "HGET")),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key, "SADD")),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key, "SMEMBERS")),
        }
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::Set(set)) => Ok(set.len()),
            Some(_) => Err(wrong_type(key, "SCARD")),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::SortedSet(HashMap::new()))
        {
            Entry::SortedSet(zset) => {
                zset.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key, "ZADD")),
        }
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::SortedSet(zset)) => Ok(zset.get(member).copied()),
            Some(_) => Err(wrong_type(key, "ZSCORE")),
        }
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::SortedSet(zset)) => Ok(zset.len()),
            Some(_) => Err(wrong_type(key, "ZCARD")),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| !e.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        let matches = matches!(entries.get(key), Some(Entry::Str { value: v, .. }) if v == value);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}
