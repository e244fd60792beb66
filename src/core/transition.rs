//! # Shared completion of one hand-off.
//!
//! A [`Transition`] resolves once the worker spawned by `restart()` became
//! active, or with the reason it never will. It is memoized and cheap to clone:
//! every `restart()` call made while a hand-off is in flight receives a clone of
//! the same transition, and all of them observe the same result.
//!
//! ```text
//! actor: Completer ──oneshot──► Shared<BoxFuture<Result<WorkerInfo, TransitionError>>>
//!                                   ├── clone ──► caller A
//!                                   └── clone ──► caller B
//! ```
//!
//! Dropping the [`Completer`] without resolving it (the actor went away)
//! resolves the transition with [`TransitionError::Destroyed`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use crate::core::WorkerInfo;
use crate::error::TransitionError;

type Outcome = Result<WorkerInfo, TransitionError>;

/// Completion of a hand-off started by [`Orchestrator::restart`](crate::Orchestrator::restart).
///
/// Awaiting it yields the new active worker.
#[derive(Clone)]
#[must_use = "a transition does nothing unless awaited; dropping it does not cancel the hand-off"]
pub struct Transition {
    inner: Shared<BoxFuture<'static, Outcome>>,
}

/// Actor side of a pending [`Transition`].
pub(crate) struct Completer {
    tx: oneshot::Sender<Outcome>,
}

impl Completer {
    pub(crate) fn resolve(self, outcome: Outcome) {
        let _ = self.tx.send(outcome);
    }
}

impl Transition {
    /// Creates a transition resolved later through the returned [`Completer`].
    pub(crate) fn pending() -> (Completer, Transition) {
        let (tx, rx) = oneshot::channel();
        let fut = rx.map(|res| res.unwrap_or(Err(TransitionError::Destroyed)));
        (Completer { tx }, Self::from_future(fut))
    }

    /// Creates an already resolved transition.
    pub(crate) fn ready(outcome: Outcome) -> Transition {
        Self::from_future(futures::future::ready(outcome))
    }

    /// Wraps the actor's reply to a restart command.
    ///
    /// If the actor never replies the transition resolves to `Destroyed`.
    pub(crate) fn deferred(reply: oneshot::Receiver<Transition>) -> Transition {
        Self::from_future(async move {
            match reply.await {
                Ok(transition) => transition.await,
                Err(_) => Err(TransitionError::Destroyed),
            }
        })
    }

    fn from_future<F>(fut: F) -> Transition
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Transition {
            inner: fut.boxed().shared(),
        }
    }

    /// Returns the result if the transition already completed.
    pub fn peek(&self) -> Option<Outcome> {
        self.inner.peek().cloned()
    }
}

impl Future for Transition {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("done", &self.inner.peek().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkerId;
    use crate::protocol::Role;

    fn info() -> WorkerInfo {
        WorkerInfo {
            id: WorkerId::new(3),
            pid: 99,
            role: Role::Initial,
        }
    }

    #[tokio::test]
    async fn clones_share_one_outcome() {
        let (completer, transition) = Transition::pending();
        let a = transition.clone();
        let b = transition.clone();

        completer.resolve(Ok(info()));
        assert_eq!(a.await, Ok(info()));
        assert_eq!(b.await, Ok(info()));
        assert_eq!(transition.peek(), Some(Ok(info())));
    }

    #[tokio::test]
    async fn dropped_completer_means_destroyed() {
        let (completer, transition) = Transition::pending();
        drop(completer);
        assert_eq!(transition.await, Err(TransitionError::Destroyed));
    }

    #[tokio::test]
    async fn deferred_follows_the_replied_transition() {
        let (reply_tx, reply_rx) = oneshot::channel();
        let deferred = Transition::deferred(reply_rx);
        let (completer, inner) = Transition::pending();

        reply_tx.send(inner).unwrap();
        completer.resolve(Err(TransitionError::WorkerExited {
            pid: 99,
            code: Some(1),
        }));

        assert_eq!(
            deferred.await,
            Err(TransitionError::WorkerExited {
                pid: 99,
                code: Some(1)
            })
        );
    }

    #[tokio::test]
    async fn deferred_without_reply_is_destroyed() {
        let (reply_tx, reply_rx) = oneshot::channel::<Transition>();
        drop(reply_tx);
        assert_eq!(
            Transition::deferred(reply_rx).await,
            Err(TransitionError::Destroyed)
        );
    }
}
