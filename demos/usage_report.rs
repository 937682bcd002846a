//! Walk two keys through both teardown paths and report usage after each step.
//!
//! Set `RUST_LOG=weak_event_cache=debug` to see the registry attach and detach.

use tracing_subscriber::EnvFilter;
use weak_event_cache::{CacheKey, CacheManager, Result};

fn main() -> Result<()> {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.try_init();

	let manager = CacheManager::new();
	let key1 = CacheKey::new(&manager, "key1")?;
	let key2 = CacheKey::new(&manager, "key2")?;
	println!("Memory usage is {}", manager.memory_usage());

	key1.dispose();
	println!("Memory usage is {}", manager.memory_usage());

	drop(key2);
	println!("Memory usage is {}", manager.memory_usage());

	Ok(())
}
