//! Actor implementations

pub mod agent;
pub mod registry;

pub use agent::{AgentActor, AgentActorArgs};
pub use registry::{AgentRegistry, AgentRegistryActor, AgentRegistryActorArgs};
