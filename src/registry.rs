use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, Weak};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::erased::{ErasedSubscription, Handler, SubscriptionKey, WeakSubscription};
use crate::error::{Error, Result};
use crate::event::Listener;
use crate::identity::ObjectId;
use crate::traits::EventSource;

type Subscription<S> = Arc<dyn ErasedSubscription<S, <S as EventSource>::Args>>;

/// Process-wide managers, one per source type.
static MANAGERS: OnceLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> = OnceLock::new();

/// Weak subscription registry for one event source type.
///
/// Records `(source, owner, handler)` triples while holding every owner by
/// [`Weak`], so subscribing never extends an owner's lifetime. The registry
/// attaches itself to a source's [`Event`](crate::Event) when the first
/// subscriber arrives and detaches when the last one leaves: however many
/// subscribers a source has, it holds exactly one strong reference, and that
/// reference points at the registry.
///
/// When the source fires, the registry visits its subscribers in insertion
/// order. Live owners get their handler called; owners that were dropped
/// without unsubscribing are skipped and their entries removed on the spot.
///
/// Handles are cheap to clone and share one registry. Use
/// [`current`](WeakEventManager::current) for the process-wide instance of a
/// source type, or [`new`](WeakEventManager::new) for an isolated one.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_event_cache::{Event, EventSource, WeakEventManager};
///
/// struct Ticker {
/// 	tick: Event<Ticker, u32>,
/// }
///
/// impl EventSource for Ticker {
/// 	type Args = u32;
///
/// 	fn event(&self) -> &Event<Self, u32> {
/// 		&self.tick
/// 	}
/// }
///
/// struct Counter(u32);
///
/// fn on_tick(counter: &Counter, _ticker: &Ticker, total: &mut u32) {
/// 	*total += counter.0;
/// }
///
/// let registry = WeakEventManager::new();
/// let ticker = Arc::new(Ticker { tick: Event::new() });
/// let counter = Arc::new(Counter(5));
///
/// registry.add_handler(&ticker, &Arc::downgrade(&counter), on_tick).unwrap();
///
/// let mut total = 0;
/// ticker.tick.raise(&ticker, &mut total);
/// assert_eq!(total, 5);
///
/// // The subscription does not keep the counter alive.
/// drop(counter);
/// let mut total = 0;
/// ticker.tick.raise(&ticker, &mut total);
/// assert_eq!(total, 0);
/// assert!(ticker.tick.is_empty());
/// ```
pub struct WeakEventManager<S: EventSource> {
	shared: Arc<Shared<S>>,
}

impl<S: EventSource> WeakEventManager<S> {
	/// Create an isolated registry.
	pub fn new() -> Self {
		Self {
			shared: Shared::new(),
		}
	}

	/// The process-wide registry for source type `S`.
	///
	/// Created on first use and never torn down.
	pub fn current() -> Self {
		let type_id = TypeId::of::<S>();
		let mut managers = MANAGERS.get_or_init(Default::default).lock();

		if let Some(existing) = managers.get(&type_id)
			&& let Ok(shared) = Arc::downcast::<Shared<S>>(existing.clone())
		{
			return Self {
				shared,
			};
		}

		tracing::debug!(source_type = std::any::type_name::<S>(), "created process-wide event manager");
		let shared = Shared::new();
		managers.insert(type_id, shared.clone());
		Self {
			shared,
		}
	}

	/// Subscribe `owner` to `source`, calling `handler` on every firing while
	/// the owner is alive.
	///
	/// Fails with [`Error::InvalidArgument`] if `owner` is dangling or already
	/// reclaimed. Subscribing the same owner and handler twice yields two
	/// entries, each removed by one [`remove_handler`](Self::remove_handler).
	pub fn add_handler<O>(
		&self,
		source: &Arc<S>,
		owner: &Weak<O>,
		handler: Handler<O, S, S::Args>,
	) -> Result<()>
	where
		O: Send + Sync + 'static,
	{
		self.shared.add_handler(source, owner, handler)
	}

	/// Remove the most recent subscription of `owner` with `handler`.
	///
	/// Returns `false` if no such subscription exists, which happens routinely
	/// when a dead entry was already purged by a firing. Takes the owner by
	/// plain reference so it can unsubscribe from inside its own `Drop`, and
	/// the source by [`Weak`] so it works after the source is gone.
	///
	/// Handlers are matched by function address. The compiler may merge
	/// functions with identical bodies, so two such handlers on the same owner
	/// are indistinguishable here; give each handler of one owner a distinct
	/// body, or subscribe one handler per owner.
	pub fn remove_handler<O>(&self, source: &Weak<S>, owner: &O, handler: Handler<O, S, S::Args>) -> bool
	where
		O: 'static,
	{
		let key = SubscriptionKey::new(ObjectId::of(owner), handler);
		let (removed, detached) = self.shared.remove_handler(ObjectId::of_weak(source), key);
		// Released outside the lock: it may be the source's last reference.
		drop(detached);
		removed
	}

	/// Forget every subscription of `source` and detach from it.
	///
	/// Returns the number of subscriptions dropped.
	pub fn remove_source(&self, source: &S) -> usize {
		let (removed, detached) = self.shared.remove_source(ObjectId::of(source));
		drop(detached);
		removed
	}

	/// Remove dead subscriptions and the lists of reclaimed sources.
	///
	/// Firing already does this lazily for the fired source; this sweeps all
	/// of them. Returns the number of subscriptions removed.
	pub fn purge(&self) -> usize {
		let (removed, detached) = self.shared.purge();
		drop(detached);
		removed
	}

	/// Stored subscriptions for `source`, including dead ones not yet purged.
	pub fn handler_count(&self, source: &S) -> usize {
		self.shared.with_source(ObjectId::of(source), |entry| entry.subscriptions.len()).unwrap_or(0)
	}

	/// Subscriptions for `source` whose owner is still alive.
	pub fn live_handler_count(&self, source: &S) -> usize {
		self.shared
			.with_source(ObjectId::of(source), |entry| {
				entry.subscriptions.iter().filter(|s| s.is_alive()).count()
			})
			.unwrap_or(0)
	}

	/// Whether the registry is currently attached to `source`.
	pub fn is_listening(&self, source: &S) -> bool {
		self.shared.with_source(ObjectId::of(source), |entry| entry.listening).unwrap_or(false)
	}

	/// Number of sources with at least one stored subscription.
	pub fn source_count(&self) -> usize {
		self.shared.sources.read().len()
	}

	/// Whether two handles share one registry.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

impl<S: EventSource> Clone for WeakEventManager<S> {
	fn clone(&self) -> Self {
		Self {
			shared: self.shared.clone(),
		}
	}
}

impl<S: EventSource> Default for WeakEventManager<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: EventSource> std::fmt::Debug for WeakEventManager<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WeakEventManager")
			.field("source_type", &std::any::type_name::<S>())
			.field("sources", &self.source_count())
			.finish()
	}
}

/// Subscriptions of one source.
struct SourceEntry<S: EventSource> {
	source: Weak<S>,
	subscriptions: Vec<Subscription<S>>,
	/// Whether the dispatcher is attached to the source's event
	listening: bool,
}

/// Registry state, also the dispatcher attached to every listened source.
struct Shared<S: EventSource> {
	sources: RwLock<HashMap<ObjectId, SourceEntry<S>>>,
	/// Handle to ourselves, used to attach and detach as a listener
	me: Weak<Shared<S>>,
}

impl<S: EventSource> Shared<S> {
	fn new() -> Arc<Self> {
		Arc::new_cyclic(|me| Self {
			sources: RwLock::new(HashMap::new()),
			me: me.clone(),
		})
	}

	fn add_handler<O>(&self, source: &Arc<S>, owner: &Weak<O>, handler: Handler<O, S, S::Args>) -> Result<()>
	where
		O: Send + Sync + 'static,
	{
		if owner.strong_count() == 0 {
			return Err(Error::InvalidArgument("owner is dangling or already reclaimed"));
		}

		let id = ObjectId::of_arc(source);
		let mut sources = self.sources.write();
		let entry = sources.entry(id).or_insert_with(|| SourceEntry {
			source: Arc::downgrade(source),
			subscriptions: Vec::new(),
			listening: false,
		});

		entry.subscriptions.push(Arc::new(WeakSubscription::new(owner, handler)));

		if !entry.listening {
			self.start_listening(source);
			entry.listening = true;
		}

		Ok(())
	}

	fn remove_handler(&self, source: ObjectId, key: SubscriptionKey) -> (bool, Option<Arc<S>>) {
		let mut sources = self.sources.write();
		let Some(entry) = sources.get_mut(&source) else {
			return (false, None);
		};
		let Some(index) = entry.subscriptions.iter().rposition(|s| s.key() == key) else {
			return (false, None);
		};

		entry.subscriptions.remove(index);
		if !entry.subscriptions.is_empty() {
			return (true, None);
		}

		let detached = sources.remove(&source).and_then(|entry| self.stop_listening(entry));
		(true, detached)
	}

	fn remove_source(&self, source: ObjectId) -> (usize, Option<Arc<S>>) {
		let mut sources = self.sources.write();
		let Some(entry) = sources.remove(&source) else {
			return (0, None);
		};

		let removed = entry.subscriptions.len();
		tracing::debug!(?source, removed, "source torn down");
		(removed, self.stop_listening(entry))
	}

	fn purge(&self) -> (usize, Vec<Arc<S>>) {
		let mut sources = self.sources.write();
		let mut removed = 0;
		let mut emptied = Vec::new();

		for (id, entry) in sources.iter_mut() {
			let before = entry.subscriptions.len();
			if entry.source.strong_count() == 0 {
				entry.subscriptions.clear();
			} else {
				entry.subscriptions.retain(|s| s.is_alive());
			}
			removed += before - entry.subscriptions.len();
			if entry.subscriptions.is_empty() {
				emptied.push(*id);
			}
		}

		let detached: Vec<Arc<S>> = emptied
			.into_iter()
			.filter_map(|id| sources.remove(&id))
			.filter_map(|entry| self.stop_listening(entry))
			.collect();

		if removed > 0 {
			tracing::trace!(removed, "purged dead subscriptions");
		}
		(removed, detached)
	}

	/// Visit the live subscribers of `source` in insertion order.
	///
	/// Runs with no lock held so handlers may subscribe, unsubscribe or drop
	/// owners re-entrantly. Entries whose owner is gone are removed afterwards.
	fn deliver(&self, source: &S, args: &mut S::Args) {
		let id = ObjectId::of(source);
		let snapshot = match self.sources.read().get(&id) {
			Some(entry) => entry.subscriptions.clone(),
			None => return,
		};

		let mut dead = 0usize;
		for subscription in &snapshot {
			if !subscription.invoke(source, args) {
				dead += 1;
			}
		}
		tracing::trace!(source = ?id, delivered = snapshot.len() - dead, dead, "delivered event");

		if dead > 0 {
			let detached = self.purge_source(id);
			drop(detached);
		}
	}

	/// Drop the dead subscriptions of one source, detaching if none remain.
	fn purge_source(&self, id: ObjectId) -> Option<Arc<S>> {
		let mut sources = self.sources.write();
		let entry = sources.get_mut(&id)?;

		entry.subscriptions.retain(|s| s.is_alive());
		if !entry.subscriptions.is_empty() {
			return None;
		}

		sources.remove(&id).and_then(|entry| self.stop_listening(entry))
	}

	fn with_source<R>(&self, id: ObjectId, f: impl FnOnce(&SourceEntry<S>) -> R) -> Option<R> {
		self.sources.read().get(&id).map(f)
	}

	fn start_listening(&self, source: &S) {
		if let Some(me) = self.me.upgrade() {
			source.event().add(me);
			tracing::debug!(source = ?ObjectId::of(source), "attached dispatcher");
		}
	}

	/// Detach from the entry's source if it is still alive.
	///
	/// Returns the upgraded source so the caller can release it after
	/// dropping the registry lock.
	fn stop_listening(&self, entry: SourceEntry<S>) -> Option<Arc<S>> {
		if !entry.listening {
			return None;
		}
		let source = entry.source.upgrade()?;
		let me: Arc<dyn Listener<S, S::Args>> = self.me.upgrade()?;
		source.event().remove(&me);
		tracing::debug!(source = ?ObjectId::of_arc(&source), "detached dispatcher");
		Some(source)
	}
}

impl<S: EventSource> Listener<S, S::Args> for Shared<S> {
	fn on_event(&self, source: &S, args: &mut S::Args) {
		self.deliver(source, args);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;
	use crate::event::Event;

	struct Source {
		event: Event<Source, u64>,
	}

	impl Source {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				event: Event::new(),
			})
		}

		fn fire(&self) -> u64 {
			let mut total = 0;
			self.event.raise(self, &mut total);
			total
		}
	}

	impl EventSource for Source {
		type Args = u64;

		fn event(&self) -> &Event<Self, u64> {
			&self.event
		}
	}

	struct Subscriber {
		value: u64,
		calls: AtomicUsize,
	}

	impl Subscriber {
		fn new(value: u64) -> Arc<Self> {
			Arc::new(Self {
				value,
				calls: AtomicUsize::new(0),
			})
		}
	}

	fn contribute(subscriber: &Subscriber, _source: &Source, total: &mut u64) {
		subscriber.calls.fetch_add(1, Ordering::Relaxed);
		*total += subscriber.value;
	}

	fn contribute_twice(subscriber: &Subscriber, _source: &Source, total: &mut u64) {
		*total += subscriber.value * 2;
	}

	#[test]
	fn test_attach_on_first_detach_on_last() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let a = Subscriber::new(1);
		let b = Subscriber::new(2);

		assert!(source.event.is_empty());

		registry.add_handler(&source, &Arc::downgrade(&a), contribute).unwrap();
		registry.add_handler(&source, &Arc::downgrade(&b), contribute).unwrap();
		assert_eq!(source.event.listener_count(), 1);
		assert!(registry.is_listening(&source));

		assert!(registry.remove_handler(&Arc::downgrade(&source), &*a, contribute));
		assert_eq!(source.event.listener_count(), 1);

		assert!(registry.remove_handler(&Arc::downgrade(&source), &*b, contribute));
		assert!(source.event.is_empty());
		assert!(!registry.is_listening(&source));
		assert_eq!(registry.source_count(), 0);
		assert_eq!(source.fire(), 0);
	}

	#[test]
	fn test_fire_sums_live_subscribers() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscribers: Vec<_> = (1..=4).map(Subscriber::new).collect();

		for subscriber in &subscribers {
			registry.add_handler(&source, &Arc::downgrade(subscriber), contribute).unwrap();
		}

		assert_eq!(source.fire(), 1 + 2 + 3 + 4);
		for subscriber in &subscribers {
			assert_eq!(subscriber.calls.load(Ordering::Relaxed), 1);
		}
	}

	#[test]
	fn test_dead_subscriber_skipped_and_purged() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let kept = Subscriber::new(3);
		let dropped = Subscriber::new(3);

		registry.add_handler(&source, &Arc::downgrade(&kept), contribute).unwrap();
		registry.add_handler(&source, &Arc::downgrade(&dropped), contribute).unwrap();
		drop(dropped);

		assert_eq!(registry.handler_count(&source), 2);
		assert_eq!(registry.live_handler_count(&source), 1);

		assert_eq!(source.fire(), 3);
		assert_eq!(registry.handler_count(&source), 1);
	}

	#[test]
	fn test_last_dead_subscriber_detaches_on_fire() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscriber = Subscriber::new(3);

		registry.add_handler(&source, &Arc::downgrade(&subscriber), contribute).unwrap();
		drop(subscriber);

		assert_eq!(source.fire(), 0);
		assert!(source.event.is_empty());
		assert_eq!(registry.source_count(), 0);
	}

	#[test]
	fn test_registry_does_not_pin_subscriber() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscriber = Subscriber::new(1);

		registry.add_handler(&source, &Arc::downgrade(&subscriber), contribute).unwrap();
		assert_eq!(Arc::strong_count(&subscriber), 1);
	}

	#[test]
	fn test_registry_does_not_pin_source() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscriber = Subscriber::new(1);

		registry.add_handler(&source, &Arc::downgrade(&subscriber), contribute).unwrap();
		let weak = Arc::downgrade(&source);
		drop(source);
		assert!(weak.upgrade().is_none());

		assert_eq!(registry.purge(), 1);
		assert_eq!(registry.source_count(), 0);
	}

	#[test]
	fn test_dangling_owner_rejected() {
		let registry = WeakEventManager::new();
		let source = Source::new();

		let result = registry.add_handler(&source, &Weak::<Subscriber>::new(), contribute);
		assert!(matches!(result, Err(Error::InvalidArgument(_))));
		assert!(source.event.is_empty());
	}

	#[test]
	fn test_remove_unknown_is_noop() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscriber = Subscriber::new(1);

		assert!(!registry.remove_handler(&Arc::downgrade(&source), &*subscriber, contribute));

		registry.add_handler(&source, &Arc::downgrade(&subscriber), contribute).unwrap();
		assert!(!registry.remove_handler(&Arc::downgrade(&source), &*subscriber, contribute_twice));
		assert!(registry.remove_handler(&Arc::downgrade(&source), &*subscriber, contribute));
		assert!(!registry.remove_handler(&Arc::downgrade(&source), &*subscriber, contribute));
	}

	#[test]
	fn test_same_owner_two_handlers() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let subscriber = Subscriber::new(1);
		let weak = Arc::downgrade(&subscriber);

		registry.add_handler(&source, &weak, contribute).unwrap();
		registry.add_handler(&source, &weak, contribute_twice).unwrap();
		assert_eq!(source.fire(), 3);

		registry.remove_handler(&Arc::downgrade(&source), &*subscriber, contribute_twice);
		assert_eq!(source.fire(), 1);
	}

	#[test]
	fn test_remove_source() {
		let registry = WeakEventManager::new();
		let source = Source::new();
		let a = Subscriber::new(1);
		let b = Subscriber::new(2);

		registry.add_handler(&source, &Arc::downgrade(&a), contribute).unwrap();
		registry.add_handler(&source, &Arc::downgrade(&b), contribute).unwrap();

		assert_eq!(registry.remove_source(&source), 2);
		assert!(source.event.is_empty());
		assert_eq!(source.fire(), 0);
		assert_eq!(registry.remove_source(&source), 0);
	}

	#[test]
	fn test_sources_are_isolated() {
		let registry = WeakEventManager::new();
		let first = Source::new();
		let second = Source::new();
		let subscriber = Subscriber::new(7);

		registry.add_handler(&first, &Arc::downgrade(&subscriber), contribute).unwrap();

		assert_eq!(first.fire(), 7);
		assert_eq!(second.fire(), 0);
		assert_eq!(registry.source_count(), 1);
	}

	struct Roster {
		event: Event<Roster, Vec<u32>>,
	}

	impl EventSource for Roster {
		type Args = Vec<u32>;

		fn event(&self) -> &Event<Self, Vec<u32>> {
			&self.event
		}
	}

	struct Member(u32);

	fn answer(member: &Member, _roster: &Roster, seen: &mut Vec<u32>) {
		seen.push(member.0);
	}

	#[test]
	fn test_delivery_follows_insertion_order() {
		let registry = WeakEventManager::new();
		let roster = Arc::new(Roster {
			event: Event::new(),
		});
		let members: Vec<_> = (1..=4).map(|id| Arc::new(Member(id))).collect();

		for member in &members {
			registry.add_handler(&roster, &Arc::downgrade(member), answer).unwrap();
		}

		let mut seen = Vec::new();
		roster.event.raise(&roster, &mut seen);
		assert_eq!(seen, vec![1, 2, 3, 4]);

		// Re-subscribing moves a member to the back.
		assert!(registry.remove_handler(&Arc::downgrade(&roster), &*members[0], answer));
		registry.add_handler(&roster, &Arc::downgrade(&members[0]), answer).unwrap();

		let mut members = members;
		drop(members.remove(1));

		let mut seen = Vec::new();
		roster.event.raise(&roster, &mut seen);
		assert_eq!(seen, vec![3, 4, 1]);
		assert_eq!(registry.handler_count(&roster), 3);
	}

	#[test]
	fn test_registry_and_event_are_send_sync() {
		fn assert_send_sync<T: Send + Sync>() {}

		assert_send_sync::<WeakEventManager<Roster>>();
		assert_send_sync::<Event<Roster, Vec<u32>>>();
	}

	#[test]
	fn test_current_is_shared_per_type() {
		let a = WeakEventManager::<Source>::current();
		let b = WeakEventManager::<Source>::current();
		assert!(a.ptr_eq(&b));
		assert!(!a.ptr_eq(&WeakEventManager::new()));
	}
}
