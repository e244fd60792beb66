//! # Handshake vocabulary.
//!
//! | Message   | Token          | Direction             |
//! |-----------|----------------|-----------------------|
//! | `Ready`   | `ready`        | worker → orchestrator |
//! | `Serve`   | `serve`        | orchestrator → worker |
//! | `Restart` | `restart`      | worker → orchestrator |
//! | `Exit`    | `exit[:code]`  | worker → orchestrator |
//!
//! ## Example
//! ```rust
//! use handover::Message;
//!
//! assert_eq!(Message::parse("exit:3").unwrap(), Message::Exit { code: 3 });
//! assert_eq!(Message::Exit { code: 3 }.to_string(), "exit:3");
//! assert_eq!(Message::parse("exit").unwrap(), Message::Exit { code: 0 });
//! ```

use std::fmt;

use crate::error::ProtocolError;

const READY: &str = "ready";
const SERVE: &str = "serve";
const RESTART: &str = "restart";
const EXIT: &str = "exit";

/// Control-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    /// Worker finished booting and may become active.
    Ready,
    /// Worker is now the active one and should start accepting real work.
    Serve,
    /// Worker asks for a new hand-off cycle.
    Restart,
    /// Worker asks to terminate the whole application with `code`.
    Exit {
        /// Process exit code for the supervisor (`0` when omitted on the wire).
        code: i32,
    },
}

/// Which side of the channel may send a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    WorkerToOrchestrator,
    OrchestratorToWorker,
}

impl Message {
    /// Parses a single token (without the line terminator).
    pub fn parse(token: &str) -> Result<Self, ProtocolError> {
        match token {
            READY => Ok(Message::Ready),
            SERVE => Ok(Message::Serve),
            RESTART => Ok(Message::Restart),
            EXIT => Ok(Message::Exit { code: 0 }),
            other => match other.strip_prefix("exit:") {
                Some(value) => value
                    .trim()
                    .parse::<i32>()
                    .map(|code| Message::Exit { code })
                    .map_err(|_| ProtocolError::InvalidExitCode {
                        value: value.to_string(),
                    }),
                None => Err(ProtocolError::UnknownToken {
                    token: other.to_string(),
                }),
            },
        }
    }

    /// Returns who is allowed to send this message.
    pub fn direction(&self) -> Direction {
        match self {
            Message::Serve => Direction::OrchestratorToWorker,
            Message::Ready | Message::Restart | Message::Exit { .. } => {
                Direction::WorkerToOrchestrator
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Ready => f.write_str(READY),
            Message::Serve => f.write_str(SERVE),
            Message::Restart => f.write_str(RESTART),
            Message::Exit { code } => write!(f, "{EXIT}:{code}"),
        }
    }
}
