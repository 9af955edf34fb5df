//! Cortex core: the perception→cognition cycle.
//!
//! - [`encoder`]: translator output → fixed 256-slot input vector
//! - [`reservoir`]: boundary to the stateful recurrent engine
//! - [`agent`]: two-tier agent invocation with JSON recovery and defaults
//! - [`orchestrator`]: the cycle state machine tying the three together

pub mod agent;
pub mod archive;
pub mod encoder;
pub mod error;
pub mod orchestrator;
pub mod reservoir;
pub mod types;

pub use agent::{AgentClient, AgentProfiles, AgentReply, AgentRole, ReplySource, RoleProfile};
pub use encoder::SensoryEncoder;
pub use error::{CortexError, ReservoirError, Result};
pub use orchestrator::{CycleFailure, CycleOrchestrator, CycleReport, CycleState};
pub use reservoir::{Reservoir, SharedReservoir};
pub use types::{
    CognitiveOutput, InputVector, MemoryFlag, NeuralInputEvent, NeurogenesisRequest,
    TranslatorOutput, VECTOR_SIZE,
};
