use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::identity::ObjectId;
use crate::shard::Shard;

/// Default number of shards.
pub(crate) const DEFAULT_SHARD_COUNT: usize = 16;

/// Thread-safe identity-keyed table that never keeps its keys alive.
///
/// Keys are stored as [`std::sync::Weak`] and looked up by allocation
/// identity, not by `Eq`. Once the last strong reference to a key is dropped,
/// its entry is invisible to every lookup and enumeration, even before any
/// explicit [`remove`](WeakTable::remove). Dead slots are compacted
/// opportunistically on insert, and eagerly with [`purge`](WeakTable::purge).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_event_cache::WeakTable;
///
/// let table = WeakTable::new();
/// let key = Arc::new("session");
///
/// table.insert(&key, 42).unwrap();
/// assert_eq!(table.get(&*key), Some(42));
///
/// drop(key);
/// assert!(table.is_empty());
/// ```
pub struct WeakTable<K, V> {
	/// Sharded storage
	shards: Vec<RwLock<Shard<K, V>>>,
	/// Number of shards, always a power of two
	shard_count: usize,
}

impl<K, V> WeakTable<K, V> {
	/// Create a table with the default shard count.
	pub fn new() -> Self {
		Self::with_shards(DEFAULT_SHARD_COUNT)
	}

	/// Create with a custom shard count, rounded up to the next power of two.
	pub fn with_shards(shard_count: usize) -> Self {
		let shard_count = shard_count.next_power_of_two().max(1);
		let shards = (0..shard_count).map(|_| RwLock::new(Shard::new())).collect();
		Self {
			shards,
			shard_count,
		}
	}

	/// Associate `value` with the identity of `key`.
	///
	/// Fails with [`Error::DuplicateKey`] if the key is already present; the
	/// existing entry is left untouched. Only a weak reference to `key` is
	/// stored.
	pub fn insert(&self, key: &Arc<K>, value: V) -> Result<()> {
		let id = ObjectId::of_arc(key);
		let mut shard = self.shard(id).write();

		// Reclaimed keys leave slots behind until someone sweeps them
		if shard.needs_purge() {
			let purged = shard.purge();
			if purged > 0 {
				tracing::trace!(purged, "compacted dead membership slots");
			}
		}

		shard.insert(id, key, value).map_err(|_| Error::DuplicateKey)
	}

	/// Remove the entry for `key`, returning its value.
	///
	/// Returns `None` if the key was never added or was already removed, so
	/// repeated calls are harmless. Takes a plain reference so a key can remove
	/// itself from inside its own `Drop`.
	pub fn remove(&self, key: &K) -> Option<V> {
		let id = ObjectId::of(key);
		self.shard(id).write().remove(&id).map(|slot| slot.value)
	}

	/// Get a clone of the value associated with a live key.
	pub fn get(&self, key: &K) -> Option<V>
	where
		V: Clone,
	{
		self.get_with(key, V::clone)
	}

	/// Run `f` on the value associated with a live key.
	///
	/// The shard's read lock is held while `f` runs.
	pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
		let id = ObjectId::of(key);
		let shard = self.shard(id).read();
		shard.get(&id).map(|slot| f(&slot.value))
	}

	/// Check whether a live entry exists for `key`.
	pub fn contains(&self, key: &K) -> bool {
		let id = ObjectId::of(key);
		self.shard(id).read().get(&id).is_some()
	}

	/// Number of entries whose key is still alive.
	pub fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().live_len()).sum()
	}

	/// Number of stored slots, including ones not yet purged.
	pub fn raw_len(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().raw_len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Snapshot of the live keys.
	///
	/// The returned `Arc`s are strong: holding the snapshot keeps the keys alive.
	pub fn keys(&self) -> Vec<Arc<K>> {
		let mut keys = Vec::new();
		for shard_lock in &self.shards {
			let shard = shard_lock.read();
			keys.extend(shard.live().filter_map(|slot| slot.key.upgrade()));
		}
		keys
	}

	/// Snapshot of the live entries.
	pub fn entries(&self) -> Vec<(Arc<K>, V)>
	where
		V: Clone,
	{
		let mut entries = Vec::new();
		for shard_lock in &self.shards {
			let shard = shard_lock.read();
			entries.extend(
				shard.live().filter_map(|slot| Some((slot.key.upgrade()?, slot.value.clone()))),
			);
		}
		entries
	}

	/// Drop every slot whose key has been reclaimed.
	///
	/// Returns the number of slots removed.
	pub fn purge(&self) -> usize {
		let purged: usize = self.shards.iter().map(|shard| shard.write().purge()).sum();
		if purged > 0 {
			tracing::trace!(purged, "purged dead membership slots");
		}
		purged
	}

	/// Remove all entries.
	pub fn clear(&self) {
		for shard_lock in &self.shards {
			shard_lock.write().clear();
		}
	}

	/// Number of shards.
	pub fn shard_count(&self) -> usize {
		self.shard_count
	}

	/// Get the shard for a given identity.
	fn shard(&self, id: ObjectId) -> &RwLock<Shard<K, V>> {
		let index = (id.hash_value() as usize) & (self.shard_count - 1);
		&self.shards[index]
	}
}

impl<K, V> Default for WeakTable<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K, V> std::fmt::Debug for WeakTable<K, V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WeakTable")
			.field("len", &self.len())
			.field("shard_count", &self.shard_count)
			.finish()
	}
}
