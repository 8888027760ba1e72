//! The receive loop feeding raw events to the dispatcher.

use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchStatsSnapshot, Dispatcher};
use super::events::RawEvent;
use super::watcher::EventStream;

/// Owns the event stream and runs every event through the dispatcher, one at
/// a time, until shutdown.
pub struct WatchLoop {
    stream: EventStream,
    dispatcher: Dispatcher,
}

impl WatchLoop {
    #[must_use]
    pub fn new(stream: EventStream, dispatcher: Dispatcher) -> Self {
        Self { stream, dispatcher }
    }

    /// Run until `shutdown` is cancelled or the event stream closes.
    ///
    /// Subscription errors are logged and do not stop the loop. Returns the
    /// final dispatch counters.
    pub async fn run(self, shutdown: CancellationToken) -> DispatchStatsSnapshot {
        let Self {
            mut stream,
            dispatcher,
        } = self;
        let mut errors_open = true;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping watch loop");
                    break;
                }

                event = stream.events.recv() => match event {
                    Some(event) => handle_event(&dispatcher, event).await,
                    None => {
                        while let Ok(e) = stream.errors.try_recv() {
                            tracing::error!(error = %e, "error");
                        }
                        tracing::info!("Event stream closed, stopping watch loop");
                        break;
                    }
                },

                error = stream.errors.recv(), if errors_open => match error {
                    Some(e) => tracing::error!(error = %e, "error"),
                    None => errors_open = false,
                },
            }
        }

        let snapshot = dispatcher.stats().snapshot();
        tracing::info!(
            received = snapshot.events_received,
            executed = snapshot.executed,
            exec_failures = snapshot.exec_failures,
            no_rule = snapshot.dropped_no_rule,
            kind_filtered = snapshot.dropped_kind,
            filename_filtered = snapshot.dropped_filename,
            glob_errors = snapshot.glob_errors,
            render_errors = snapshot.render_errors,
            "Watch loop stopped"
        );
        snapshot
    }
}

async fn handle_event(dispatcher: &Dispatcher, event: RawEvent) {
    // Permission-only changes never reach rule resolution.
    if event.op.is_chmod_only() {
        tracing::trace!(file_name = %event.path.display(), "skipping chmod event");
        return;
    }

    tracing::debug!(
        event = %event.op,
        file_name = %event.path.display(),
        "event"
    );
    dispatcher.dispatch(&event).await;
}
