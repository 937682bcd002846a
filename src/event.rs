use std::sync::Arc;

use parking_lot::Mutex;

/// Receiver attached to an [`Event`].
pub trait Listener<S: ?Sized, A>: Send + Sync {
	/// Handle one firing. `args` is the accumulator shared by every listener
	/// of this firing.
	fn on_event(&self, source: &S, args: &mut A);
}

impl<S: ?Sized, A, F> Listener<S, A> for F
where
	F: Fn(&S, &mut A) + Send + Sync,
{
	fn on_event(&self, source: &S, args: &mut A) {
		self(source, args)
	}
}

/// Multicast notification point owned by an event source.
///
/// Listeners are held by strong `Arc`, so they should be dispatch entry points
/// (such as a [`WeakEventManager`](crate::WeakEventManager)) rather than the
/// subscribers themselves.
///
/// [`raise`](Event::raise) snapshots the listener list and releases the lock
/// before calling anything, so a listener may add or remove listeners while it
/// runs. Changes take effect from the next firing.
pub struct Event<S: ?Sized, A> {
	listeners: Mutex<Vec<Arc<dyn Listener<S, A>>>>,
}

impl<S: ?Sized, A> Event<S, A> {
	pub fn new() -> Self {
		Self {
			listeners: Mutex::new(Vec::new()),
		}
	}

	/// Append a listener. The same listener may be added more than once.
	pub fn add(&self, listener: Arc<dyn Listener<S, A>>) {
		self.listeners.lock().push(listener);
	}

	/// Remove the most recently added occurrence of `listener`.
	///
	/// Returns `false` if the listener was not attached.
	pub fn remove(&self, listener: &Arc<dyn Listener<S, A>>) -> bool {
		let mut listeners = self.listeners.lock();
		match listeners.iter().rposition(|l| same_listener(l, listener)) {
			Some(index) => {
				listeners.remove(index);
				true
			}
			None => false,
		}
	}

	/// Call every attached listener in order.
	pub fn raise(&self, source: &S, args: &mut A) {
		let snapshot: Vec<Arc<dyn Listener<S, A>>> = self.listeners.lock().clone();
		for listener in snapshot {
			listener.on_event(source, args);
		}
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.listener_count() == 0
	}
}

impl<S: ?Sized, A> Default for Event<S, A> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: ?Sized, A> std::fmt::Debug for Event<S, A> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Event").field("listeners", &self.listener_count()).finish()
	}
}

/// Compare two listeners by allocation, ignoring vtable metadata.
fn same_listener<S: ?Sized, A>(a: &Arc<dyn Listener<S, A>>, b: &Arc<dyn Listener<S, A>>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
