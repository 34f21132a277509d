//! Operation status channel
//!
//! A single system-wide status slot with three states:
//! - **Pending**: an operation was submitted and awaits its result
//! - **Success**: terminal, visible for the success window
//! - **Error**: terminal, visible for the error window, carries the cause
//!
//! Every publication bumps an epoch. Timed dismissals and abandoned
//! operations only clear the slot if it still shows the epoch they own, so a
//! newer status is never hidden by an older operation.

use parking_lot::Mutex;
use payveil_core::{LifecycleConfig, OperationKind};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Three-state status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Awaiting result
    Pending,
    /// Completed successfully
    Success,
    /// Failed
    Error,
}

impl OperationStatus {
    /// Whether this status ends an operation.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Whether anything should be shown
    pub visible: bool,
    /// Current status
    pub status: OperationStatus,
    /// Human-readable message
    pub message: String,
    /// Operation that produced the status
    pub kind: Option<OperationKind>,
}

impl StatusSnapshot {
    fn hidden() -> Self {
        Self {
            visible: false,
            status: OperationStatus::Pending,
            message: String::new(),
            kind: None,
        }
    }
}

#[derive(Debug)]
struct ReporterState {
    epoch: u64,
    current: StatusSnapshot,
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct ReporterInner {
    state: Mutex<ReporterState>,
    updates: watch::Sender<StatusSnapshot>,
    success_window: Duration,
    error_window: Duration,
}

/// Shared status channel. Cloning yields another handle to the same slot.
#[derive(Debug, Clone)]
pub struct OperationStatusReporter {
    inner: Arc<ReporterInner>,
}

impl OperationStatusReporter {
    /// Create a reporter with explicit display windows.
    pub fn new(success_window: Duration, error_window: Duration) -> Self {
        let (updates, _) = watch::channel(StatusSnapshot::hidden());
        Self {
            inner: Arc::new(ReporterInner {
                state: Mutex::new(ReporterState {
                    epoch: 0,
                    current: StatusSnapshot::hidden(),
                    deadline: None,
                }),
                updates,
                success_window,
                error_window,
            }),
        }
    }

    /// Create a reporter with the configured display windows.
    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self::new(config.success_display(), config.error_display())
    }

    /// Current status, with expired terminal states reading as hidden.
    pub fn current(&self) -> StatusSnapshot {
        let mut state = self.inner.state.lock();
        if let Some(deadline) = state.deadline {
            if Instant::now() >= deadline {
                state.current.visible = false;
                state.deadline = None;
            }
        }
        state.current.clone()
    }

    /// Subscribe to published transitions.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Publish Pending for a new operation, preempting whatever is shown.
    pub fn begin(&self, kind: OperationKind, message: impl Into<String>) -> StatusTicket {
        let epoch = self.publish(kind, OperationStatus::Pending, message.into());
        StatusTicket {
            reporter: self.clone(),
            kind,
            epoch,
            finished: false,
        }
    }

    /// Publish a terminal Success without a preceding Pending.
    pub fn report_success(&self, kind: OperationKind, message: impl Into<String>) {
        self.publish(kind, OperationStatus::Success, message.into());
    }

    /// Publish a terminal Error without a preceding Pending.
    pub fn report_error(&self, kind: OperationKind, message: impl Into<String>) {
        self.publish(kind, OperationStatus::Error, message.into());
    }

    fn publish(&self, kind: OperationKind, status: OperationStatus, message: String) -> u64 {
        let window = match status {
            OperationStatus::Pending => None,
            OperationStatus::Success => Some(self.inner.success_window),
            OperationStatus::Error => Some(self.inner.error_window),
        };

        let (epoch, snapshot, deadline) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.current = StatusSnapshot {
                visible: true,
                status,
                message,
                kind: Some(kind),
            };
            state.deadline = window.map(|w| Instant::now() + w);
            (state.epoch, state.current.clone(), state.deadline)
        };

        tracing::debug!(%kind, ?status, epoch, message = %snapshot.message, "status published");
        self.inner.updates.send_replace(snapshot);

        if let Some(deadline) = deadline {
            self.schedule_dismissal(epoch, deadline);
        }
        epoch
    }

    fn schedule_dismissal(&self, epoch: u64, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak: Weak<ReporterInner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                OperationStatusReporter { inner }.hide_if_current(epoch, false);
            }
        });
    }

    fn update_pending(&self, epoch: u64, message: String) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.current.status != OperationStatus::Pending {
                return;
            }
            state.current.message = message;
            state.current.clone()
        };
        self.inner.updates.send_replace(snapshot);
    }

    /// Hide the slot if `epoch` is still displayed. With `pending_only`,
    /// only a Pending status is withdrawn.
    fn hide_if_current(&self, epoch: u64, pending_only: bool) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || !state.current.visible {
                return;
            }
            if pending_only && state.current.status != OperationStatus::Pending {
                return;
            }
            state.current.visible = false;
            state.deadline = None;
            state.current.clone()
        };
        self.inner.updates.send_replace(snapshot);
    }
}

impl Default for OperationStatusReporter {
    fn default() -> Self {
        Self::from_config(&LifecycleConfig::default())
    }
}

/// Handle to one operation's Pending status.
///
/// Dropping a ticket without calling [`succeed`](Self::succeed) or
/// [`fail`](Self::fail) withdraws its Pending status if it is still shown.
#[derive(Debug)]
pub struct StatusTicket {
    reporter: OperationStatusReporter,
    kind: OperationKind,
    epoch: u64,
    finished: bool,
}

impl StatusTicket {
    /// Replace the Pending message while this operation is still displayed.
    pub fn update(&self, message: impl Into<String>) {
        self.reporter.update_pending(self.epoch, message.into());
    }

    /// Publish Success.
    pub fn succeed(mut self, message: impl Into<String>) {
        self.finished = true;
        self.reporter
            .publish(self.kind, OperationStatus::Success, message.into());
    }

    /// Publish Error.
    pub fn fail(mut self, message: impl Into<String>) {
        self.finished = true;
        self.reporter
            .publish(self.kind, OperationStatus::Error, message.into());
    }
}

impl Drop for StatusTicket {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(kind = %self.kind, epoch = self.epoch, "operation abandoned");
            self.reporter.hide_if_current(self.epoch, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> OperationStatusReporter {
        OperationStatusReporter::new(Duration::from_millis(2_000), Duration::from_millis(3_000))
    }

    #[tokio::test(start_paused = true)]
    async fn success_auto_clears_after_window() {
        let reporter = reporter();
        let ticket = reporter.begin(OperationKind::Create, "Creating...");
        assert_eq!(reporter.current().status, OperationStatus::Pending);

        ticket.succeed("Created");
        assert!(reporter.current().visible);

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert!(reporter.current().visible);
        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!reporter.current().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn error_window_is_longer() {
        let reporter = reporter();
        reporter.report_error(OperationKind::Decrypt, "Decryption failed: boom");

        tokio::time::advance(Duration::from_millis(2_500)).await;
        let snapshot = reporter.current();
        assert!(snapshot.visible);
        assert_eq!(snapshot.status, OperationStatus::Error);
        assert_eq!(snapshot.message, "Decryption failed: boom");

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!reporter.current().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_preempts_terminal_and_survives_old_timer() {
        let reporter = reporter();
        reporter.report_success(OperationKind::Create, "Created");
        tokio::time::advance(Duration::from_millis(500)).await;

        let _ticket = reporter.begin(OperationKind::Decrypt, "Decrypting...");
        tokio::time::advance(Duration::from_millis(5_000)).await;
        tokio::task::yield_now().await;

        let snapshot = reporter.current();
        assert!(snapshot.visible);
        assert_eq!(snapshot.status, OperationStatus::Pending);
        assert_eq!(snapshot.kind, Some(OperationKind::Decrypt));
    }

    #[tokio::test]
    async fn dropped_ticket_withdraws_pending() {
        let reporter = reporter();
        let ticket = reporter.begin(OperationKind::Decrypt, "Decrypting...");
        drop(ticket);
        assert!(!reporter.current().visible);
    }

    #[tokio::test]
    async fn dropped_ticket_keeps_newer_status() {
        let reporter = reporter();
        let stale = reporter.begin(OperationKind::Decrypt, "first");
        let _fresh = reporter.begin(OperationKind::Create, "second");
        drop(stale);

        let snapshot = reporter.current();
        assert!(snapshot.visible);
        assert_eq!(snapshot.message, "second");
    }

    #[tokio::test]
    async fn update_only_touches_own_pending() {
        let reporter = reporter();
        let first = reporter.begin(OperationKind::Create, "Creating...");
        first.update("Waiting for confirmation...");
        assert_eq!(reporter.current().message, "Waiting for confirmation...");

        let _second = reporter.begin(OperationKind::Decrypt, "Decrypting...");
        first.update("stale");
        assert_eq!(reporter.current().message, "Decrypting...");
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let reporter = reporter();
        let mut rx = reporter.subscribe();

        let ticket = reporter.begin(OperationKind::Create, "Creating...");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, OperationStatus::Pending);

        ticket.fail("Encryption failed: engine offline");
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.status, OperationStatus::Error);
        assert!(seen.visible);
    }
}
