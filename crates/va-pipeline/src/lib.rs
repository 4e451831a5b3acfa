pub mod bus;
pub mod orchestrator;
pub mod state;

pub use bus::SessionBus;
pub use orchestrator::PipelineOrchestrator;
pub use state::{ProcessingStateManager, SessionStatus, SlotGuard};
