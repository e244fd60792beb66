//! # Worker side of the handshake.
//!
//! [`WorkerClient`] runs inside every spawned worker. It reads the role and
//! timeout markers, adopts the inherited control socket and drives the
//! `ready` / `serve` exchange.
//!
//! ```text
//! initial worker                     recurring worker
//!   await_ready()                      await_ready()
//!     └─ ready ──► orchestrator          ├─ ready ──► orchestrator
//!     └─ Ok(()) (serve immediately)      ├─ wait for serve (≤ ipc timeout)
//!                                        └─ Ok(()) / Timeout / Channel
//! ```
//!
//! The handshake is memoized: concurrent and repeated `await_ready()` calls
//! share one outcome and only one `ready` is written until [`WorkerClient::reset`].
//!
//! ## Example
//! ```rust,no_run
//! use handover::WorkerClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WorkerClient::from_env()?;
//!     // bind listeners, warm caches...
//!     if let Err(err) = client.await_ready().await {
//!         if err.is_fatal() {
//!             std::process::exit(1);
//!         }
//!     }
//!     // start accepting traffic
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::protocol::{ChannelReader, ChannelWriter, ControlChannel, Message, Role, env};

/// Handshake client used inside a worker process.
pub struct WorkerClient {
    role: Option<Role>,
    timeout: Duration,
    link: Option<ClientLink>,
    ready: OnceCell<Result<(), ClientError>>,
}

/// Connected control channel: a writer plus a background reader that
/// counts every `serve` received.
struct ClientLink {
    writer: Mutex<ChannelWriter>,
    serve: watch::Receiver<u64>,
    reader: JoinHandle<()>,
}

impl ClientLink {
    fn new(channel: ControlChannel) -> Self {
        let (reader, writer) = channel.split();
        let (serve_tx, serve) = watch::channel(0);
        Self {
            writer: Mutex::new(writer),
            serve,
            reader: tokio::spawn(read_loop(reader, serve_tx)),
        }
    }

    async fn send(&self, msg: Message) -> Result<(), ClientError> {
        self.writer.lock().await.send(msg).await?;
        Ok(())
    }
}

impl Drop for ClientLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Counts `serve`; dropping `serve_tx` on return marks the channel closed.
async fn read_loop(mut reader: ChannelReader, serve_tx: watch::Sender<u64>) {
    while let Some(frame) = reader.recv().await {
        match frame {
            Ok(Message::Serve) => {
                serve_tx.send_modify(|served| *served += 1);
            }
            Ok(msg) => tracing::debug!(%msg, "ignoring worker-only message"),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "skipping malformed control frame");
            }
            Err(err) => {
                tracing::debug!(error = %err, "control channel failed");
                break;
            }
        }
    }
}

impl WorkerClient {
    /// Creates a client from explicit parts.
    ///
    /// `role: None` means the current process is the supervisor. Must be
    /// called within a Tokio runtime when `channel` is given.
    pub fn new(role: Option<Role>, timeout: Duration, channel: Option<ControlChannel>) -> Self {
        Self {
            role,
            timeout,
            link: channel.map(ClientLink::new),
            ready: OnceCell::new(),
        }
    }

    /// Creates a client from the markers the orchestrator set on this process.
    ///
    /// On the supervisor this succeeds and yields a client whose operations
    /// return [`ClientError::NotWorker`]. The inherited control socket can be
    /// adopted once per process; a second call fails with
    /// [`ClientError::Channel`].
    pub fn from_env() -> Result<Self, ClientError> {
        let role = Role::detect();
        let timeout = env::ipc_timeout();
        let channel = match role {
            Some(_) => inherited::adopt()?,
            None => None,
        };
        Ok(Self::new(role, timeout, channel))
    }

    /// Role of this process, `None` on the supervisor.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Handshake timeout applied by [`await_ready`](Self::await_ready).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` when connected to an orchestrator.
    pub fn has_channel(&self) -> bool {
        self.link.is_some()
    }

    /// Reports readiness and, for a recurring worker, waits for `serve`.
    ///
    /// - supervisor: [`ClientError::NotWorker`];
    /// - initial: sends `ready` and returns without waiting;
    /// - recurring: requires a channel ([`ClientError::NoChannel`]), sends
    ///   `ready` and waits for `serve` at most the IPC timeout
    ///   ([`ClientError::Timeout`]).
    pub async fn await_ready(&self) -> Result<(), ClientError> {
        self.ready.get_or_init(|| self.handshake()).await.clone()
    }

    /// Forgets the memoized handshake outcome.
    ///
    /// The next [`await_ready`](Self::await_ready) performs a fresh handshake,
    /// e.g. after the orchestrator that issued `serve` went away. A recurring
    /// worker then waits for a `serve` sent after its new `ready`.
    pub fn reset(&mut self) {
        self.ready.take();
    }

    async fn handshake(&self) -> Result<(), ClientError> {
        let role = self.role.ok_or(ClientError::NotWorker)?;
        match (role, &self.link) {
            (Role::Initial, None) => {
                tracing::debug!("initial worker without control channel");
                Ok(())
            }
            (Role::Initial, Some(link)) => link.send(Message::Ready).await,
            (Role::Recurring, None) => Err(ClientError::NoChannel),
            (Role::Recurring, Some(link)) => {
                let mut serve = link.serve.clone();
                let seen = *serve.borrow_and_update();
                link.send(Message::Ready).await?;

                let waited = tokio::time::timeout(self.timeout, async move {
                    serve.wait_for(|served| *served > seen).await.map(|_| ())
                })
                .await;
                match waited {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(ClientError::Channel {
                        reason: "closed before serve".into(),
                    }),
                    Err(_) => {
                        tracing::warn!(timeout = ?self.timeout, "no serve from orchestrator");
                        Err(ClientError::Timeout {
                            timeout: self.timeout,
                        })
                    }
                }
            }
        }
    }

    /// Asks the orchestrator to start a new hand-off.
    pub async fn request_restart(&self) -> Result<(), ClientError> {
        self.link()?.send(Message::Restart).await
    }

    /// Asks the orchestrator to shut the whole application down with `code`.
    pub async fn request_exit(&self, code: i32) -> Result<(), ClientError> {
        self.link()?.send(Message::Exit { code }).await
    }

    fn link(&self) -> Result<&ClientLink, ClientError> {
        if self.role.is_none() {
            return Err(ClientError::NotWorker);
        }
        self.link.as_ref().ok_or(ClientError::NoChannel)
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("role", &self.role)
            .field("timeout", &self.timeout)
            .field("channel", &self.link.is_some())
            .field("ready", &self.ready.get())
            .finish()
    }
}

#[cfg(unix)]
mod inherited {
    use std::os::unix::io::{FromRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::error::ClientError;
    use crate::protocol::{ControlChannel, env::CHANNEL_FD_VAR};

    static ADOPTED: AtomicBool = AtomicBool::new(false);

    /// Takes ownership of the descriptor named by `HANDOVER_CHANNEL_FD`.
    pub(super) fn adopt() -> Result<Option<ControlChannel>, ClientError> {
        let Ok(raw) = std::env::var(CHANNEL_FD_VAR) else {
            return Ok(None);
        };
        let fd: RawFd = raw.trim().parse().map_err(|_| ClientError::Channel {
            reason: format!("invalid {CHANNEL_FD_VAR}={raw:?}"),
        })?;
        if ADOPTED.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Channel {
                reason: "control channel already adopted".into(),
            });
        }

        // SAFETY: the descriptor was installed by the orchestrator for this
        // process and the flag above guarantees it is wrapped only once.
        let stream = unsafe { UnixStream::from_raw_fd(fd) };
        ControlChannel::from_std(stream)
            .map(Some)
            .map_err(|err| ClientError::Channel {
                reason: err.to_string(),
            })
    }
}

#[cfg(not(unix))]
mod inherited {
    use crate::error::ClientError;
    use crate::protocol::ControlChannel;

    pub(super) fn adopt() -> Result<Option<ControlChannel>, ClientError> {
        Ok(None)
    }
}
