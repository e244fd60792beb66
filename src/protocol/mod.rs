//! Handshake protocol shared by the orchestrator and its workers.
//!
//! The wire is a narrow, dedicated control channel, so messages are short
//! newline-terminated ASCII tokens rather than structured payloads.
//!
//! ## Contents
//! - [`Message`] the vocabulary (`ready`, `serve`, `restart`, `exit[:code]`)
//! - [`MessageCodec`] `tokio_util` codec framing messages as lines
//! - [`ControlChannel`] framed duplex transport split into reader/writer halves
//! - [`env`] environment markers carrying role, timeout and channel descriptor
//!
//! ## Handshake
//! ```text
//!  worker                         orchestrator
//!    │ ── ready ───────────────────────► │  (once per lifetime)
//!    │                                   ├─► retire previous active worker
//!    │ ◄────────────────────── serve ─── │  (only after ready)
//!    │ ── restart ─────────────────────► │  new hand-off cycle (coalesced)
//!    │ ── exit:<code> ─────────────────► │  shut the application down
//! ```

mod channel;
mod codec;
pub mod env;
mod message;

pub use channel::{ChannelReader, ChannelWriter, ControlChannel, Transport};
pub use codec::{MAX_FRAME_LEN, MessageCodec};
pub use env::Role;
pub use message::{Direction, Message};
