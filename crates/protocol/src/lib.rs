pub mod constants;
pub mod envelope;
pub mod frame;
pub mod messages;
pub mod relay;

// Re-export primary types for convenience.
pub use constants::{ACK_TIMEOUT, CHUNK_SIZE, RELAY_PACING};
pub use envelope::{ClientEvent, ResumeEntry, ResumeState, ServerEvent};
pub use frame::{Frame, FramingError, decode_frame, encode_frame};
pub use messages::{Ack, ChunkHeader, ControlMessage, FileMeta};
pub use relay::{RelayChunk, RelayPayload};
