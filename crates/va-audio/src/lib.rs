pub mod error;
pub mod frame;
pub mod intake;

pub use error::{AudioError, Result};
pub use frame::{AudioChunkEnvelope, FrameUnit};
pub use intake::AudioIntake;
