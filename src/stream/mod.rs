pub mod assembler;
pub mod jpeg;
pub mod mailbox;
pub mod receiver;

pub use assembler::{Frame, FrameAssembler};
pub use mailbox::LatestFrameMailbox;
pub use receiver::{ReceiverConfig, StreamReceiver, StreamState};
