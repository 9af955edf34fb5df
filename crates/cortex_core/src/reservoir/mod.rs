//! Boundary to the stateful reservoir engine.
//!
//! The cycle subsystem treats the engine as opaque: it is initialized once,
//! fed input vectors, stepped, and asked for a summary string. Everything
//! else about its dynamics stays behind this trait.

pub mod leaky;
pub mod recording;

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ReservoirError;
use crate::types::InputVector;

pub use leaky::LeakyReservoir;
pub use recording::{ReservoirCall, RecordingReservoir};

/// Neuron count used by the mobile client.
pub const DEFAULT_NEURON_COUNT: i32 = 20_000;
/// Outgoing connections per neuron used by the mobile client.
pub const DEFAULT_FANOUT: i32 = 8;

pub trait Reservoir: Send {
    /// Build the engine. `false` means the cycle subsystem cannot start.
    fn initialize(&mut self, neuron_count: i32, fanout: i32) -> bool;

    fn apply_inputs(&mut self, vector: &InputVector) -> Result<(), ReservoirError>;

    fn step(&mut self) -> Result<(), ReservoirError>;

    /// Opaque snapshot passed verbatim to the cognitive prompt.
    fn export_summary(&mut self) -> Result<String, ReservoirError>;
}

/// The single shared handle. Every call sequence holds the lock throughout.
pub type SharedReservoir = Arc<Mutex<dyn Reservoir>>;

/// Wrap an engine into a [`SharedReservoir`].
pub fn share<R: Reservoir + 'static>(reservoir: R) -> SharedReservoir {
    Arc::new(Mutex::new(reservoir))
}

/// Initialize `reservoir`, mapping a `false` return to a boundary error.
pub fn initialize<R: Reservoir + ?Sized>(
    reservoir: &mut R,
    neuron_count: i32,
    fanout: i32,
) -> Result<(), ReservoirError> {
    if reservoir.initialize(neuron_count, fanout) {
        Ok(())
    } else {
        Err(ReservoirError::InitFailed {
            neuron_count,
            fanout,
        })
    }
}
