use std::sync::Arc;

use crate::manager::CacheManager;
use crate::registry::WeakEventManager;
use crate::table::DEFAULT_SHARD_COUNT;

/// Builder for configuring a [`CacheManager`].
///
/// # Example
///
/// ```
/// use weak_event_cache::{CacheManager, WeakEventManager};
///
/// let manager = CacheManager::builder()
///     .shards(64)
///     .registry(WeakEventManager::new()) // isolated from the process-wide one
///     .build();
/// assert!(manager.is_empty());
/// ```
pub struct CacheManagerBuilder {
	shard_count: Option<usize>,
	registry: Option<WeakEventManager<CacheManager>>,
}

impl CacheManagerBuilder {
	pub fn new() -> Self {
		Self {
			shard_count: None,
			registry: None,
		}
	}

	/// Set the number of membership shards.
	///
	/// More shards reduce contention between threads registering keys.
	/// Will be rounded up to the next power of 2.
	///
	/// Default: 16 shards
	pub fn shards(mut self, count: usize) -> Self {
		self.shard_count = Some(count);
		self
	}

	/// Use `registry` instead of the process-wide one.
	///
	/// Managers built with the same registry share its bookkeeping, which is
	/// mostly useful to observe it from tests.
	pub fn registry(mut self, registry: WeakEventManager<CacheManager>) -> Self {
		self.registry = Some(registry);
		self
	}

	/// Build the manager with the configured settings.
	pub fn build(self) -> Arc<CacheManager> {
		let shard_count = self.shard_count.unwrap_or(DEFAULT_SHARD_COUNT);
		let registry = self.registry.unwrap_or_else(WeakEventManager::current);
		Arc::new(CacheManager::with_parts(shard_count, registry))
	}
}

impl Default for CacheManagerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_default() {
		let manager = CacheManagerBuilder::new().build();
		assert!(manager.is_empty());
		assert!(manager.registry().ptr_eq(&WeakEventManager::current()));
	}

	#[test]
	fn test_builder_with_registry() {
		let registry = WeakEventManager::new();
		let manager = CacheManagerBuilder::new().registry(registry.clone()).build();
		assert!(manager.registry().ptr_eq(&registry));
		assert!(!manager.registry().ptr_eq(&WeakEventManager::current()));
	}

	#[test]
	fn test_builder_full_config() {
		let manager = CacheManagerBuilder::new().shards(3).registry(WeakEventManager::new()).build();

		assert!(manager.is_empty());
		assert_eq!(manager.memory_usage(), 0);
	}
}
