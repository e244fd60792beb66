use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::actor::{Actor, ExitHandler};
use super::orchestrator::Orchestrator;
use crate::{
    core::Config,
    events::{Bus, Event, EventKind},
    launch::{Launch, ProcessLauncher},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Orchestrator`] with optional collaborators.
pub struct OrchestratorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Option<Arc<dyn Launch>>,
    exit_handler: Option<ExitHandler>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            launcher: None,
            exit_handler: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the process launcher (default: [`ProcessLauncher`]).
    pub fn with_launcher(mut self, launcher: Arc<dyn Launch>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Replaces what happens when a worker requests `exit:<code>`
    /// (default: [`std::process::exit`]).
    ///
    /// The handler runs after every worker was terminated.
    pub fn with_exit_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit_handler = Some(Arc::new(handler));
        self
    }

    /// Builds the orchestrator and spawns its tasks.
    ///
    /// Must be called inside a tokio runtime. No worker is launched until the
    /// first [`Orchestrator::restart`].
    pub fn build(self) -> Orchestrator {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let root = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let launcher: Arc<dyn Launch> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ProcessLauncher::new()),
        };
        let exit_handler: ExitHandler = match self.exit_handler {
            Some(handler) => handler,
            None => Arc::new(exit_process),
        };

        if !subs.is_empty() {
            subscriber_listener(bus.subscribe(), subs);
        }

        let actor = Actor::new(
            self.cfg,
            launcher,
            bus.clone(),
            root.clone(),
            tx.clone(),
            exit_handler,
        );
        tokio::spawn(actor.run(rx));

        Orchestrator::new_internal(tx, bus, root)
    }
}

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// Forwards bus events to the subscriber set until the orchestrator is destroyed.
fn subscriber_listener(mut rx: broadcast::Receiver<Event>, subs: SubscriberSet) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let last = ev.kind == EventKind::Destroyed;
                    subs.emit_arc(Arc::new(ev));
                    if last {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
    });
}
