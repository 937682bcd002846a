use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry as HashMapEntry;

use crate::identity::ObjectId;

/// Minimum number of inserts between two opportunistic purges of a shard.
const PURGE_INTERVAL: usize = 32;

/// A membership slot: the weak key next to its associated value.
pub(crate) struct Slot<K, V> {
	pub key: Weak<K>,
	pub value: V,
}

impl<K, V> Slot<K, V> {
	/// A slot is live while its key has at least one strong reference.
	#[inline]
	pub fn is_live(&self) -> bool {
		self.key.strong_count() > 0
	}
}

/// A single shard of a weak table.
///
/// The shard is not thread-safe on its own; the table wraps it in RwLock.
pub(crate) struct Shard<K, V> {
	slots: HashMap<ObjectId, Slot<K, V>>,
	/// Inserts since the last purge
	inserts: usize,
}

impl<K, V> Shard<K, V> {
	pub fn new() -> Self {
		Self {
			slots: HashMap::new(),
			inserts: 0,
		}
	}

	/// Insert a slot unless the identity is already taken.
	///
	/// Returns the value back if the identity is present.
	pub fn insert(&mut self, id: ObjectId, key: &Arc<K>, value: V) -> Result<(), V> {
		match self.slots.entry(id) {
			HashMapEntry::Occupied(_) => Err(value),
			HashMapEntry::Vacant(vacant) => {
				vacant.insert(Slot {
					key: Arc::downgrade(key),
					value,
				});
				self.inserts += 1;
				Ok(())
			}
		}
	}

	/// Get the live slot for an identity.
	pub fn get(&self, id: &ObjectId) -> Option<&Slot<K, V>> {
		self.slots.get(id).filter(|slot| slot.is_live())
	}

	/// Remove a slot, live or dead.
	pub fn remove(&mut self, id: &ObjectId) -> Option<Slot<K, V>> {
		self.slots.remove(id)
	}

	pub fn live_len(&self) -> usize {
		self.slots.values().filter(|slot| slot.is_live()).count()
	}

	pub fn raw_len(&self) -> usize {
		self.slots.len()
	}

	/// Iterate over live slots.
	pub fn live(&self) -> impl Iterator<Item = &Slot<K, V>> {
		self.slots.values().filter(|slot| slot.is_live())
	}

	/// Whether enough inserts happened since the last purge to make a sweep
	/// worth its cost. Keeps the amortized insert cost constant.
	pub fn needs_purge(&self) -> bool {
		self.inserts >= self.slots.len().max(PURGE_INTERVAL)
	}

	/// Drop every slot whose key has been reclaimed.
	///
	/// Returns the number of slots removed.
	pub fn purge(&mut self) -> usize {
		self.inserts = 0;
		let before = self.slots.len();
		self.slots.retain(|_, slot| slot.is_live());
		before - self.slots.len()
	}

	pub fn clear(&mut self) {
		self.slots.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_insert_rejects_taken_identity() {
		let mut shard = Shard::new();
		let key = Arc::new("a");
		let id = ObjectId::of_arc(&key);

		assert!(shard.insert(id, &key, 1).is_ok());
		assert_eq!(shard.insert(id, &key, 2), Err(2));
		assert_eq!(shard.get(&id).map(|slot| slot.value), Some(1));
	}

	#[test]
	fn test_dead_slot_is_hidden_then_purged() {
		let mut shard = Shard::new();
		let key = Arc::new(10u32);
		let id = ObjectId::of_arc(&key);
		shard.insert(id, &key, "v").unwrap();

		drop(key);

		assert!(shard.get(&id).is_none());
		assert_eq!(shard.live_len(), 0);
		assert_eq!(shard.raw_len(), 1);
		assert_eq!(shard.purge(), 1);
		assert_eq!(shard.raw_len(), 0);
	}

	#[test]
	fn test_needs_purge_after_interval() {
		let mut shard = Shard::new();
		let keys: Vec<_> = (0..PURGE_INTERVAL).map(Arc::new).collect();

		for key in &keys[..PURGE_INTERVAL - 1] {
			shard.insert(ObjectId::of_arc(key), key, ()).unwrap();
		}
		assert!(!shard.needs_purge());

		let last = &keys[PURGE_INTERVAL - 1];
		shard.insert(ObjectId::of_arc(last), last, ()).unwrap();
		assert!(shard.needs_purge());

		shard.purge();
		assert!(!shard.needs_purge());
	}

	#[test]
	fn test_remove_is_repeatable() {
		let mut shard = Shard::new();
		let key = Arc::new(1i64);
		let id = ObjectId::of_arc(&key);
		shard.insert(id, &key, ()).unwrap();

		assert!(shard.remove(&id).is_some());
		assert!(shard.remove(&id).is_none());
	}
}
