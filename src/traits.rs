use crate::event::Event;

/// An object that owns exactly one broadcast event.
///
/// The associated `Args` type is the accumulator passed by mutable reference
/// to every subscriber during one firing.
///
/// # Example
///
/// ```
/// use weak_event_cache::{Event, EventSource};
///
/// struct Thermometer {
/// 	reading: Event<Thermometer, Vec<f32>>,
/// }
///
/// impl EventSource for Thermometer {
/// 	type Args = Vec<f32>;
///
/// 	fn event(&self) -> &Event<Self, Self::Args> {
/// 		&self.reading
/// 	}
/// }
/// ```
pub trait EventSource: Send + Sync + Sized + 'static {
	/// Accumulator mutated by subscribers during a firing.
	type Args: 'static;

	/// The source's broadcast point.
	fn event(&self) -> &Event<Self, Self::Args>;
}
