use std::sync::Arc;

use crate::builder::CacheManagerBuilder;
use crate::error::Result;
use crate::event::Event;
use crate::key::{CacheKey, KeyInner};
use crate::registry::WeakEventManager;
use crate::table::WeakTable;
use crate::traits::EventSource;

/// Accumulator filled by every live key during one [`CacheManager::fire`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageReport {
	/// Sum of the contributions of every visited key, saturating at
	/// `u64::MAX`.
	pub bytes: u64,
	/// Number of keys that contributed.
	pub contributors: usize,
}

impl UsageReport {
	/// Add one key's contribution.
	pub fn record(&mut self, bytes: u64) {
		self.bytes = self.bytes.saturating_add(bytes);
		self.contributors += 1;
	}
}

/// Cache manager that tracks its keys without keeping them alive.
///
/// Keys join the manager through [`CacheKey::new`], which subscribes them to
/// the manager's usage event and records their membership. The manager holds
/// no strong reference to any key: membership is a [`WeakTable`], and the
/// only listener on its event is the shared [`WeakEventManager`].
///
/// # Example
///
/// ```
/// use weak_event_cache::{CacheKey, CacheManager};
///
/// let manager = CacheManager::new();
/// let key1 = CacheKey::new(&manager, "key1").unwrap();
/// let key2 = CacheKey::new(&manager, "key2").unwrap();
/// assert_eq!(manager.memory_usage(), 6);
///
/// key1.dispose();
/// assert_eq!(manager.memory_usage(), 3);
///
/// // Dropping without disposing cleans up as well.
/// drop(key2);
/// assert_eq!(manager.memory_usage(), 0);
/// ```
pub struct CacheManager {
	/// Membership, keyed by key identity
	members: WeakTable<KeyInner, Arc<str>>,
	/// Usage broadcast point
	usage: Event<CacheManager, UsageReport>,
	/// Registry the keys subscribe through
	registry: WeakEventManager<CacheManager>,
}

impl CacheManager {
	/// Create a manager using the process-wide registry.
	pub fn new() -> Arc<Self> {
		Self::builder().build()
	}

	pub fn builder() -> CacheManagerBuilder {
		CacheManagerBuilder::new()
	}

	pub(crate) fn with_parts(shard_count: usize, registry: WeakEventManager<CacheManager>) -> Self {
		Self {
			members: WeakTable::with_shards(shard_count),
			usage: Event::new(),
			registry,
		}
	}

	/// Record `key` as a member.
	///
	/// Fails with [`Error::DuplicateKey`](crate::Error::DuplicateKey) if it is
	/// already one. Does not subscribe the key; [`CacheKey::new`] does both.
	pub fn register_member(&self, key: &CacheKey) -> Result<()> {
		self.members.insert(key.inner(), key.label_arc())
	}

	/// Drop `key`'s membership. Returns `false` if it was not a member.
	pub fn unregister_member(&self, key: &CacheKey) -> bool {
		self.forget_member(key.inner())
	}

	/// Drop both the membership and the subscription of `key`.
	///
	/// The key stays usable and can still be disposed; disposing it afterwards
	/// finds nothing left to clean up.
	pub fn remove(&self, key: &CacheKey) -> bool {
		let unregistered = self.unregister_member(key);
		let unsubscribed = key.inner().unsubscribe();
		unregistered || unsubscribed
	}

	/// Fire the usage event and return the aggregate of every live key.
	///
	/// Synchronous: the report reflects exactly the keys alive when the call
	/// starts, minus any disposed while it runs.
	pub fn fire(&self) -> UsageReport {
		let mut report = UsageReport::default();
		self.usage.raise(self, &mut report);
		report
	}

	/// Total bytes reported by the live keys.
	pub fn memory_usage(&self) -> u64 {
		self.fire().bytes
	}

	pub fn contains(&self, key: &CacheKey) -> bool {
		self.members.contains(key.inner())
	}

	/// Number of live members.
	pub fn len(&self) -> usize {
		self.members.len()
	}

	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	/// Snapshot of the live members.
	///
	/// The returned handles are strong and keep their keys alive while held.
	pub fn members(&self) -> Vec<CacheKey> {
		self.members.keys().into_iter().map(CacheKey::from_inner).collect()
	}

	/// Labels of the live members, in no particular order.
	pub fn labels(&self) -> Vec<Arc<str>> {
		self.members.entries().into_iter().map(|(_, label)| label).collect()
	}

	/// Compact membership and subscription bookkeeping left by reclaimed keys.
	///
	/// Returns the number of stale entries removed.
	pub fn purge(&self) -> usize {
		self.members.purge() + self.registry.purge()
	}

	/// Whether the registry is attached to this manager's event.
	pub fn has_listeners(&self) -> bool {
		!self.usage.is_empty()
	}

	/// The registry keys subscribe through.
	pub fn registry(&self) -> &WeakEventManager<CacheManager> {
		&self.registry
	}

	pub(crate) fn forget_member(&self, key: &KeyInner) -> bool {
		self.members.remove(key).is_some()
	}
}

impl EventSource for CacheManager {
	type Args = UsageReport;

	fn event(&self) -> &Event<Self, UsageReport> {
		&self.usage
	}
}

impl Drop for CacheManager {
	fn drop(&mut self) {
		self.registry.remove_source(self);
	}
}

impl std::fmt::Debug for CacheManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheManager")
			.field("members", &self.members.len())
			.field("listening", &self.has_listeners())
			.finish()
	}
}
