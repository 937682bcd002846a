use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, Teardown};
use crate::manager::{CacheManager, UsageReport};
use crate::registry::WeakEventManager;

/// Usage reported by a key created with [`CacheKey::new`].
pub const DEFAULT_USAGE_BYTES: u64 = 3;

/// A labelled cache key.
///
/// `CacheKey` is a cheap-clone handle; clones share one key. The key joins
/// its manager on construction and leaves it exactly once, through whichever
/// comes first:
///
/// - [`dispose`](CacheKey::dispose), called explicitly, or
/// - the drop of the last handle, if nobody disposed it.
///
/// Neither the manager nor its registry keeps a key alive.
#[derive(Clone)]
pub struct CacheKey {
	inner: Arc<KeyInner>,
}

impl CacheKey {
	/// Create a key reporting [`DEFAULT_USAGE_BYTES`] and join `manager`.
	pub fn new(manager: &Arc<CacheManager>, label: impl Into<String>) -> Result<Self> {
		Self::with_usage(manager, label, DEFAULT_USAGE_BYTES)
	}

	/// Create a key reporting `usage_bytes` on every firing and join `manager`.
	///
	/// Fails with [`Error::InvalidArgument`] if `label` is empty. The key is
	/// subscribed before it becomes a member, so no member ever exists without
	/// a subscription.
	pub fn with_usage(manager: &Arc<CacheManager>, label: impl Into<String>, usage_bytes: u64) -> Result<Self> {
		let label = label.into();
		if label.is_empty() {
			return Err(Error::InvalidArgument("key label must not be empty"));
		}

		let key = Self {
			inner: Arc::new(KeyInner {
				label: label.into(),
				usage_bytes,
				manager: Arc::downgrade(manager),
				registry: manager.registry().clone(),
				lifecycle: Lifecycle::new(),
			}),
		};

		manager.registry().add_handler(manager, &Arc::downgrade(&key.inner), KeyInner::on_usage)?;
		manager.register_member(&key)?;
		Ok(key)
	}

	pub(crate) fn from_inner(inner: Arc<KeyInner>) -> Self {
		Self {
			inner,
		}
	}

	pub(crate) fn inner(&self) -> &Arc<KeyInner> {
		&self.inner
	}

	pub(crate) fn label_arc(&self) -> Arc<str> {
		self.inner.label.clone()
	}

	/// Leave the manager now.
	///
	/// Returns `true` only for the call that performed the cleanup; later
	/// calls, and the eventual drop, do nothing.
	pub fn dispose(&self) -> bool {
		self.inner.teardown(Teardown::Disposed)
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.lifecycle.is_disposed()
	}

	pub fn label(&self) -> &str {
		&self.inner.label
	}

	pub fn usage_bytes(&self) -> u64 {
		self.inner.usage_bytes
	}

	/// The manager this key joined, if it still exists.
	pub fn manager(&self) -> Option<Arc<CacheManager>> {
		self.inner.manager.upgrade()
	}

	/// Whether both handles refer to the same key.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// A weak handle that does not keep the key alive.
	pub fn downgrade(&self) -> WeakCacheKey {
		WeakCacheKey {
			inner: Arc::downgrade(&self.inner),
		}
	}
}

impl std::fmt::Debug for CacheKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheKey")
			.field("label", &self.inner.label)
			.field("usage_bytes", &self.inner.usage_bytes)
			.field("teardown", &self.inner.lifecycle.teardown())
			.finish()
	}
}

/// Non-owning handle to a [`CacheKey`].
#[derive(Clone, Debug)]
pub struct WeakCacheKey {
	inner: Weak<KeyInner>,
}

impl WeakCacheKey {
	pub fn upgrade(&self) -> Option<CacheKey> {
		self.inner.upgrade().map(CacheKey::from_inner)
	}

	/// Whether the key has been reclaimed.
	pub fn is_dead(&self) -> bool {
		self.inner.strong_count() == 0
	}
}

pub(crate) struct KeyInner {
	label: Arc<str>,
	usage_bytes: u64,
	manager: Weak<CacheManager>,
	registry: WeakEventManager<CacheManager>,
	lifecycle: Lifecycle,
}

impl KeyInner {
	fn on_usage(&self, _manager: &CacheManager, report: &mut UsageReport) {
		report.record(self.usage_bytes);
	}

	/// Remove the usage subscription. Returns `false` if it was already gone.
	pub(crate) fn unsubscribe(&self) -> bool {
		self.registry.remove_handler(&self.manager, self, Self::on_usage)
	}

	/// Run cleanup once, for whichever path gets here first.
	fn teardown(&self, how: Teardown) -> bool {
		if !self.lifecycle.begin_teardown(how) {
			return false;
		}

		let unsubscribed = self.unsubscribe();
		let unregistered = self.manager.upgrade().is_some_and(|manager| manager.forget_member(self));
		tracing::info!(label = %self.label, unsubscribed, unregistered, "key {}", how.as_str());
		true
	}
}

impl std::fmt::Debug for KeyInner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyInner").field("label", &self.label).finish_non_exhaustive()
	}
}

impl Drop for KeyInner {
	fn drop(&mut self) {
		self.teardown(Teardown::Finalized);
	}
}
