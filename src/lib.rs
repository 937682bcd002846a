//! # Weak Event Cache
//!
//! Associate data with key objects, and let those keys listen to a shared
//! manager, without either relation keeping the keys alive:
//! - **Weak membership** ([`WeakTable`]): identity-keyed entries that vanish
//!   once their key's last `Arc` is dropped
//! - **Weak subscriptions** ([`WeakEventManager`]): one registry per source
//!   type is the only listener a source ever holds, and it holds subscribers
//!   by [`Weak`](std::sync::Weak)
//! - **Exactly-once teardown** ([`Lifecycle`]): explicit dispose and drop race
//!   safely; cleanup runs once, on whichever path gets there first
//!
//! ## Quick Start
//!
//! ```rust
//! use weak_event_cache::{CacheKey, CacheManager};
//!
//! let manager = CacheManager::new();
//!
//! let key1 = CacheKey::new(&manager, "key1").unwrap();
//! let key2 = CacheKey::new(&manager, "key2").unwrap();
//!
//! // Every live key adds its usage to the report
//! assert_eq!(manager.memory_usage(), 6);
//!
//! // Explicit disposal unsubscribes right away
//! key1.dispose();
//! assert_eq!(manager.memory_usage(), 3);
//!
//! // So does dropping the last handle
//! drop(key2);
//! assert_eq!(manager.memory_usage(), 0);
//! ```
//!
//! ## Custom Sources
//!
//! Any type owning an [`Event`] can use the registry by implementing
//! [`EventSource`]. Handlers are plain `fn` pointers taking the owner by
//! reference, so they cannot capture it:
//!
//! ```rust
//! use std::sync::Arc;
//! use weak_event_cache::{Event, EventSource, WeakEventManager};
//!
//! struct Sensor {
//!     readings: Event<Sensor, Vec<f64>>,
//! }
//!
//! impl EventSource for Sensor {
//!     type Args = Vec<f64>;
//!
//!     fn event(&self) -> &Event<Self, Vec<f64>> {
//!         &self.readings
//!     }
//! }
//!
//! struct Probe {
//!     offset: f64,
//! }
//!
//! fn sample(probe: &Probe, _sensor: &Sensor, out: &mut Vec<f64>) {
//!     out.push(20.0 + probe.offset);
//! }
//!
//! let registry = WeakEventManager::new();
//! let sensor = Arc::new(Sensor { readings: Event::new() });
//! let probe = Arc::new(Probe { offset: 0.5 });
//! registry.add_handler(&sensor, &Arc::downgrade(&probe), sample).unwrap();
//!
//! let mut out = Vec::new();
//! sensor.readings.raise(&sensor, &mut out);
//! assert_eq!(out, vec![20.5]);
//! ```
//!
//! ## Thread Safety
//!
//! [`CacheManager`], [`CacheKey`], [`Event`] and [`WeakEventManager`] are
//! `Send + Sync`. [`WeakTable<K, V>`](WeakTable) is only when `K` and `V` are.
//! Callbacks run with no internal lock held, so a handler may subscribe,
//! unsubscribe or dispose keys while a firing is in progress, and a key's last
//! handle may be dropped on any thread.

mod builder;
mod erased;
mod error;
mod event;
mod identity;
mod key;
mod lifecycle;
mod manager;
mod registry;
mod shard;
mod table;
mod traits;

pub use builder::CacheManagerBuilder;
pub use erased::Handler;
pub use error::{Error, Result};
pub use event::{Event, Listener};
pub use identity::ObjectId;
pub use key::{CacheKey, DEFAULT_USAGE_BYTES, WeakCacheKey};
pub use lifecycle::{Lifecycle, Teardown};
pub use manager::{CacheManager, UsageReport};
pub use registry::WeakEventManager;
pub use table::WeakTable;
pub use traits::EventSource;
