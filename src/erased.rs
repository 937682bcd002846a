use std::any::TypeId;
use std::sync::Weak;

use crate::identity::ObjectId;

/// Handler invoked for a live subscriber.
///
/// A plain function pointer rather than a closure: it cannot capture the
/// owner, so a subscription can never hold the owner alive.
pub type Handler<O, S, A> = fn(&O, &S, &mut A);

/// Identity of a subscription: who subscribed, and with which handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
	pub owner: ObjectId,
	pub owner_type: TypeId,
	pub handler: usize,
}

impl SubscriptionKey {
	pub fn new<O: 'static, S, A>(owner: ObjectId, handler: Handler<O, S, A>) -> Self {
		Self {
			owner,
			owner_type: TypeId::of::<O>(),
			handler: handler as usize,
		}
	}
}

/// Type-erased subscription entry stored by the registry.
///
/// Lets one per-source list hold subscribers of different owner types.
pub(crate) trait ErasedSubscription<S, A>: Send + Sync {
	fn key(&self) -> SubscriptionKey;

	/// Whether the owner still has a strong reference somewhere.
	fn is_alive(&self) -> bool;

	/// Upgrade the owner and run the handler.
	///
	/// Returns `false` without calling anything if the owner is gone.
	fn invoke(&self, source: &S, args: &mut A) -> bool;
}

/// A subscription that holds its owner weakly.
pub(crate) struct WeakSubscription<O, S, A> {
	owner: Weak<O>,
	handler: Handler<O, S, A>,
	key: SubscriptionKey,
}

impl<O: 'static, S, A> WeakSubscription<O, S, A> {
	pub fn new(owner: &Weak<O>, handler: Handler<O, S, A>) -> Self {
		Self {
			key: SubscriptionKey::new(ObjectId::of_weak(owner), handler),
			owner: owner.clone(),
			handler,
		}
	}
}

impl<O, S, A> ErasedSubscription<S, A> for WeakSubscription<O, S, A>
where
	O: Send + Sync + 'static,
{
	fn key(&self) -> SubscriptionKey {
		self.key
	}

	fn is_alive(&self) -> bool {
		self.owner.strong_count() > 0
	}

	fn invoke(&self, source: &S, args: &mut A) -> bool {
		let Some(owner) = self.owner.upgrade() else {
			return false;
		};
		(self.handler)(&owner, source, args);
		// Dropping `owner` here may run the owner's own cleanup if the last
		// external reference vanished during the call; no lock is held.
		true
	}
}
