use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Identity of a shared allocation.
///
/// Two ids are equal exactly when they name the same allocation. The address
/// cannot be reused by another value while any `Arc` or `Weak` to the
/// allocation is alive, so an id stored next to a `Weak` stays unique for the
/// lifetime of that entry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
	/// Identity of the value behind a plain reference.
	///
	/// For a value living inside an `Arc`, this matches [`ObjectId::of_arc`],
	/// which lets a value compute its own id from `&self` (including in `Drop`).
	pub fn of<T: ?Sized>(value: &T) -> Self {
		Self(std::ptr::from_ref(value).cast::<()>().addr())
	}

	pub fn of_arc<T: ?Sized>(arc: &Arc<T>) -> Self {
		Self(Arc::as_ptr(arc).cast::<()>().addr())
	}

	/// Identity of the allocation a weak pointer refers to.
	///
	/// Valid even after the value was dropped, as long as the `Weak` exists.
	pub fn of_weak<T>(weak: &Weak<T>) -> Self {
		Self(weak.as_ptr().cast::<()>().addr())
	}

	/// Pre-computed hash used for shard selection.
	pub(crate) fn hash_value(self) -> u64 {
		let mut hasher = ahash::AHasher::default();
		self.0.hash(&mut hasher);
		hasher.finish()
	}
}

impl Hash for ObjectId {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.hash(state);
	}
}

impl fmt::Debug for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectId({:#x})", self.0)
	}
}
