use std::sync::atomic::{AtomicU8, Ordering};

/// How a disposable value reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Teardown {
	/// The owner called `dispose()`.
	Disposed = 1,
	/// The last strong reference was dropped without an explicit dispose.
	Finalized = 2,
}

impl Teardown {
	pub fn as_str(self) -> &'static str {
		match self {
			Teardown::Disposed => "disposed",
			Teardown::Finalized => "finalized",
		}
	}
}

const ACTIVE: u8 = 0;

/// `Active -> Disposed | Finalized` state machine, safe to drive from any
/// thread.
///
/// Exactly one caller of [`begin_teardown`](Lifecycle::begin_teardown) wins;
/// every later caller, whichever path it comes from, observes the terminal
/// state and must skip its cleanup body.
#[derive(Debug)]
pub struct Lifecycle {
	state: AtomicU8,
}

impl Lifecycle {
	pub const fn new() -> Self {
		Self {
			state: AtomicU8::new(ACTIVE),
		}
	}

	/// Claim the right to run cleanup.
	///
	/// Returns `true` for the single caller that moved the state out of
	/// `Active`.
	pub fn begin_teardown(&self, how: Teardown) -> bool {
		self.state.compare_exchange(ACTIVE, how as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
	}

	/// The terminal state, or `None` while still active.
	pub fn teardown(&self) -> Option<Teardown> {
		match self.state.load(Ordering::Acquire) {
			1 => Some(Teardown::Disposed),
			2 => Some(Teardown::Finalized),
			_ => None,
		}
	}

	pub fn is_active(&self) -> bool {
		self.teardown().is_none()
	}

	/// Whether cleanup already ran, through either path.
	pub fn is_disposed(&self) -> bool {
		!self.is_active()
	}
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}
