pub mod engine;
pub mod states;

pub use engine::InstanceFlow;
pub use states::{FlowAction, LevelEvent, TransitionOutcome};
