use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::core::{error::KvError, kv::KvStore};

enum Value {
    Bytes(Vec<u8>),
    List(Vec<Vec<u8>>),
}

struct Stored {
    value: Value,
    expires_at: Option<Instant>,
}

impl Stored {
    fn bytes(bytes: Vec<u8>, ttl: Duration) -> Self {
        Self { value: Value::Bytes(bytes), expires_at: deadline(ttl) }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    (!ttl.is_zero()).then(|| Instant::now() + ttl)
}

// Sharded in-memory engine. Expiry is lazy: entries are dropped on the
// first access past their deadline, never by a sweeper.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Stored>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, KvError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) if occupied.get().expired() => {
                occupied.remove();
                Err(KvError::KeyNotFound(key.to_string()))
            }
            Entry::Occupied(occupied) => match &occupied.get().value {
                Value::Bytes(bytes) => Ok(bytes.clone()),
                Value::List(_) => Err(KvError::Codec(format!("{key} holds a list"))),
            },
            Entry::Vacant(_) => Err(KvError::KeyNotFound(key.to_string())),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().expired() => {
                occupied.insert(Stored::bytes(value.as_bytes().to_vec(), ttl));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Stored::bytes(value.as_bytes().to_vec(), ttl));
                Ok(true)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.set_bytes(key, value.as_bytes(), ttl).await
    }

    async fn set_bytes(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), KvError> {
        self.entries.insert(key.to_string(), Stored::bytes(bytes.to_vec(), ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, KvError> {
        let bytes = self.read(key)?;
        String::from_utf8(bytes).map_err(|_| KvError::NotText(key.to_string()))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, KvError> {
        self.read(key)
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn append(&self, key: &str, bytes: &[u8]) -> Result<(), KvError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                Value::List(items) => {
                    items.push(bytes.to_vec());
                    Ok(())
                }
                Value::Bytes(_) => Err(KvError::Codec(format!("{key} holds a scalar"))),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Stored {
                    value: Value::List(vec![bytes.to_vec()]),
                    expires_at: None,
                });
                Ok(())
            }
        }
    }

    async fn drain(&self, key: &str) -> Result<Vec<Vec<u8>>, KvError> {
        match self.entries.remove(key) {
            Some((_, Stored { value: Value::List(items), .. })) => Ok(items),
            Some((_, Stored { value: Value::Bytes(_), .. })) => {
                Err(KvError::Codec(format!("{key} holds a scalar")))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_admits_exactly_one_writer() {
        let kv = MemoryKvStore::new();
        assert!(kv.set_nx("lock:a", "h1", Duration::ZERO).await.unwrap());
        assert!(!kv.set_nx("lock:a", "h2", Duration::ZERO).await.unwrap());
        assert_eq!(kv.get("lock:a").await.unwrap(), "h1");
    }

    #[tokio::test]
    async fn expired_entries_behave_as_missing() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.get("k").await.unwrap_err().is_not_found());
        // and the slot is free for a new set_nx
        assert!(kv.set_nx("k", "v2", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.get("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn append_then_drain_returns_all_in_order() {
        let kv = MemoryKvStore::new();
        kv.append("q", b"one").await.unwrap();
        kv.append("q", b"two").await.unwrap();
        let drained = kv.drain("q").await.unwrap();
        assert_eq!(drained, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(kv.drain("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn del_removes_the_entry() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", Duration::ZERO).await.unwrap();
        kv.del("k").await.unwrap();
        assert!(kv.get("k").await.unwrap_err().is_not_found());
    }
}
