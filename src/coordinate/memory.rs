use crate::coordinate::keys::Keys;
use crate::coordinate::{
    ActorLeaderInfo, AttemptAcquireLeaseOutput, CoordinateDriver, CoordinateError,
    ExtendLeaseOutput, GetActorLeaderOutput, NodeSubscription, StartActorAndAcquireLeaseOutput,
    StartedActorInfo,
};
use crate::types::{ActorId, ActorMetadata, NodeId};
use bytes::Bytes;
use prost::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// In-process stand-in for the shared coordination store: a key/value space with TTLs and
/// per-channel pub/sub. Clones share the same state, so one store can back many nodes in a test.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    keyspace: Keyspace,
    channels: HashMap<String, Vec<ChannelSubscriber>>,
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<Bytes>,
    offline: Arc<AtomicBool>,
}

impl Keyspace {
    fn get(&mut self, key: &str, now: Instant) -> Option<Bytes> {
        self.purge_if_expired(key, now);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Sets `key` unless a live value exists. Returns the value held after the call.
    fn set_if_absent(
        &mut self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Bytes {
        self.purge_if_expired(key, now);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        });

        entry.value.clone()
    }

    fn extend_if_eq(&mut self, key: &str, expected: &[u8], ttl: Duration, now: Instant) -> bool {
        self.purge_if_expired(key, now);
        match self.entries.get_mut(key) {
            Some(entry) if entry.value.as_ref() == expected => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    fn delete_if_eq(&mut self, key: &str, expected: &[u8], now: Instant) -> bool {
        self.purge_if_expired(key, now);
        let matches =
            matches!(self.entries.get(key), Some(entry) if entry.value.as_ref() == expected);
        if matches {
            self.entries.remove(key);
        }

        matches
    }

    fn purge_if_expired(&mut self, key: &str, now: Instant) {
        let expired = matches!(
            self.entries.get(key),
            Some(Entry { expires_at: Some(at), .. }) if *at <= now
        );
        if expired {
            self.entries.remove(key);
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with exclusive access to the keyspace, the way a server-side script would.
    fn atomically<R>(&self, f: impl FnOnce(&mut Keyspace, Instant) -> R) -> R {
        let mut state = self.state.lock().expect("MemoryStore mutex guard poison");
        f(&mut state.keyspace, Instant::now())
    }

    fn subscribe(&self, channel: &str, offline: Arc<AtomicBool>) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("MemoryStore mutex guard poison");
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(ChannelSubscriber { sender: tx, offline });

        rx
    }

    /// Delivers in publish order to every live subscriber of `channel`. Subscribers whose
    /// connection is offline miss the message.
    fn publish(&self, channel: &str, message: Bytes) -> usize {
        let mut state = self.state.lock().expect("MemoryStore mutex guard poison");
        let Some(subscribers) = state.channels.get_mut(channel) else {
            return 0;
        };

        subscribers.retain(|subscriber| !subscriber.sender.is_closed());
        subscribers
            .iter()
            .filter(|subscriber| !subscriber.offline.load(Ordering::Acquire))
            .filter(|subscriber| subscriber.sender.send(message.clone()).is_ok())
            .count()
    }
}

/// Stored form of `ActorMetadata`.
#[derive(Clone, PartialEq, prost::Message)]
struct ActorMetadataRecord {
    #[prost(string, tag = "1")]
    type_name: String,
    #[prost(string, repeated, tag = "2")]
    key: Vec<String>,
}

/// `CoordinateDriver` over a `MemoryStore`. Each node should get its own driver so that
/// `set_offline` can cut one node off from the store.
#[derive(Clone)]
pub struct MemoryCoordinateDriver {
    store: MemoryStore,
    keys: Keys,
    offline: Arc<AtomicBool>,
}

impl MemoryCoordinateDriver {
    pub fn new(store: MemoryStore) -> Self {
        MemoryCoordinateDriver {
            store,
            keys: Keys::default(),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_prefix(store: MemoryStore, prefix: impl Into<String>) -> Self {
        MemoryCoordinateDriver {
            keys: Keys::new(prefix),
            ..Self::new(store)
        }
    }

    /// Writes the actor's metadata record. Existing records are left untouched since metadata is
    /// immutable once created.
    pub fn create_actor(
        &self,
        actor_id: &ActorId,
        metadata: ActorMetadata,
    ) -> Result<(), CoordinateError> {
        self.check_online()?;

        let record = ActorMetadataRecord {
            type_name: metadata.type_name,
            key: metadata.key,
        };
        let key = self.keys.actor_metadata(actor_id);
        self.store
            .atomically(|keyspace, now| {
                keyspace.set_if_absent(&key, Bytes::from(record.encode_to_vec()), None, now)
            });

        Ok(())
    }

    /// Simulates losing the connection to the store. While offline every call fails and nothing
    /// published to this driver's subscriptions is delivered.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn check_online(&self) -> Result<(), CoordinateError> {
        if self.offline.load(Ordering::Acquire) {
            Err(CoordinateError::Unavailable("connection to store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn decode_metadata(key: &str, value: &[u8]) -> Result<ActorMetadata, CoordinateError> {
    let record = ActorMetadataRecord::decode(value).map_err(|e| CoordinateError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ActorMetadata {
        type_name: record.type_name,
        key: record.key,
    })
}

fn decode_node_id(key: &str, value: &[u8]) -> Result<NodeId, CoordinateError> {
    std::str::from_utf8(value)
        .map(NodeId::from)
        .map_err(|e| CoordinateError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn node_id_value(node_id: &NodeId) -> Bytes {
    Bytes::copy_from_slice(node_id.as_str().as_bytes())
}

#[async_trait::async_trait]
impl CoordinateDriver for MemoryCoordinateDriver {
    async fn create_node_subscriber(
        &self,
        node_id: &NodeId,
    ) -> Result<NodeSubscription, CoordinateError> {
        self.check_online()?;
        let receiver = self
            .store
            .subscribe(&self.keys.node_messages(node_id), self.offline.clone());

        Ok(NodeSubscription::new(receiver))
    }

    async fn publish_to_node(
        &self,
        node_id: &NodeId,
        message: Bytes,
    ) -> Result<(), CoordinateError> {
        self.check_online()?;
        self.store.publish(&self.keys.node_messages(node_id), message);

        Ok(())
    }

    async fn get_actor_leader(
        &self,
        actor_id: &ActorId,
    ) -> Result<GetActorLeaderOutput, CoordinateError> {
        self.check_online()?;

        let metadata_key = self.keys.actor_metadata(actor_id);
        let lease_key = self.keys.actor_lease(actor_id);
        let (metadata, lease) = self.store.atomically(|keyspace, now| {
            (keyspace.get(&metadata_key, now), keyspace.get(&lease_key, now))
        });

        if metadata.is_none() {
            return Ok(GetActorLeaderOutput { actor: None });
        }

        let leader_node_id = match lease {
            Some(value) => Some(decode_node_id(&lease_key, &value)?),
            None => None,
        };

        Ok(GetActorLeaderOutput {
            actor: Some(ActorLeaderInfo { leader_node_id }),
        })
    }

    async fn start_actor_and_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<StartActorAndAcquireLeaseOutput, CoordinateError> {
        self.check_online()?;

        let metadata_key = self.keys.actor_metadata(actor_id);
        let lease_key = self.keys.actor_lease(actor_id);
        let result = self.store.atomically(|keyspace, now| {
            let metadata = keyspace.get(&metadata_key, now)?;
            let holder = keyspace.set_if_absent(
                &lease_key,
                node_id_value(node_id),
                Some(lease_duration),
                now,
            );
            Some((metadata, holder))
        });

        let Some((metadata, holder)) = result else {
            return Ok(StartActorAndAcquireLeaseOutput { actor: None });
        };

        Ok(StartActorAndAcquireLeaseOutput {
            actor: Some(StartedActorInfo {
                metadata: decode_metadata(&metadata_key, &metadata)?,
                leader_node_id: decode_node_id(&lease_key, &holder)?,
            }),
        })
    }

    async fn extend_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<ExtendLeaseOutput, CoordinateError> {
        self.check_online()?;

        let lease_key = self.keys.actor_lease(actor_id);
        let lease_valid = self.store.atomically(|keyspace, now| {
            keyspace.extend_if_eq(&lease_key, node_id.as_str().as_bytes(), lease_duration, now)
        });

        Ok(ExtendLeaseOutput { lease_valid })
    }

    async fn attempt_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<AttemptAcquireLeaseOutput, CoordinateError> {
        self.check_online()?;

        let lease_key = self.keys.actor_lease(actor_id);
        let holder = self.store.atomically(|keyspace, now| {
            keyspace.set_if_absent(&lease_key, node_id_value(node_id), Some(lease_duration), now)
        });

        Ok(AttemptAcquireLeaseOutput {
            new_leader_node_id: decode_node_id(&lease_key, &holder)?,
        })
    }

    async fn release_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
    ) -> Result<(), CoordinateError> {
        self.check_online()?;

        let lease_key = self.keys.actor_lease(actor_id);
        self.store
            .atomically(|keyspace, now| {
                keyspace.delete_if_eq(&lease_key, node_id.as_str().as_bytes(), now)
            });

        Ok(())
    }
}
