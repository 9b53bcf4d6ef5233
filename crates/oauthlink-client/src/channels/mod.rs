//! Delivery Channels
//!
//! Two independent, unreliable paths by which the redirect page announces
//! an outcome:
//!
//! - **MessageChannel**: window message tagged `<TAG>_CONNECTED`
//! - **StorageChannel**: short-lived record under `<tag>_auth_result` in the
//!   shared store, for when isolation policy blocks window messages
//!
//! Every channel hands back a [`Subscription`], the only handle to the
//! observation it started. The arbiter keeps them in a [`DisposeBag`] and
//! disposes all of them exactly once on any terminal transition.

mod message;
mod storage;

pub use message::MessageChannel;
pub use storage::{evaluate_record, RecordVerdict, StorageChannel};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use oauthlink_core::{AuthorizationOutcome, CorrelationToken, Provider, SignalSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// What a channel is observing for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelContext {
    pub provider: Provider,
    pub attempt: CorrelationToken,
}

/// Outcome delivered by a channel, tagged with the attempt it was observed for
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub attempt: CorrelationToken,
    pub source: SignalSource,
    pub outcome: AuthorizationOutcome,
}

#[derive(Debug)]
pub(crate) enum ArbiterInput {
    Delivered(Signal),
    PopupClosed,
}

/// Write end handed to channels; feeds the arbiter
#[derive(Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<ArbiterInput>,
}

impl SignalSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ArbiterInput>) -> Self {
        Self { tx }
    }

    /// Returns `false` when the arbiter has already gone away.
    pub fn deliver(&self, signal: Signal) -> bool {
        self.tx.send(ArbiterInput::Delivered(signal)).is_ok()
    }

    pub(crate) fn popup_closed(&self) -> bool {
        self.tx.send(ArbiterInput::PopupClosed).is_ok()
    }
}

/// Capability shared by both delivery paths: observe for an outcome of
/// one attempt, deliver it at most once, stop when disposed.
pub trait DeliveryChannel: Send + Sync {
    fn source(&self) -> SignalSource;

    fn subscribe(
        &self,
        ctx: ChannelContext,
        sink: SignalSink,
        ledger: &RegistrationLedger,
    ) -> Subscription;
}

// ============================================================================
// Registration ledger
// ============================================================================

#[derive(Debug, Default)]
struct LedgerCounts {
    registered: AtomicUsize,
    released: AtomicUsize,
}

/// Counts listener/timer registrations against their releases.
///
/// After any terminal state `active()` must be back to zero.
#[derive(Debug, Clone, Default)]
pub struct RegistrationLedger {
    counts: Arc<LedgerCounts>,
}

impl RegistrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, name: &'static str) {
        let total = self.counts.registered.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(registration = name, total, "[Ledger] Registered");
    }

    fn release(&self, name: &'static str) {
        let total = self.counts.released.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(registration = name, total, "[Ledger] Released");
    }

    pub fn registered(&self) -> usize {
        self.counts.registered.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counts.released.load(Ordering::SeqCst)
    }

    /// Registrations not yet released
    pub fn active(&self) -> usize {
        self.registered().saturating_sub(self.released())
    }
}

// ============================================================================
// Subscription / DisposeBag
// ============================================================================

/// Dispose handle for one listener or timer.
///
/// Disposing is idempotent and also happens on drop.
pub struct Subscription {
    name: &'static str,
    cancel: CancellationToken,
    disposed: AtomicBool,
    ledger: RegistrationLedger,
}

impl Subscription {
    /// Run `task` until it finishes or the subscription is disposed.
    pub fn spawn<F>(name: &'static str, ledger: &RegistrationLedger, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        ledger.register(name);

        tokio::spawn(async move {
            // A disposed subscription never runs its task again
            tokio::select! {
                biased;
                _ = stop.cancelled() => {}
                _ = task => {}
            }
        });

        Self {
            name,
            cancel,
            disposed: AtomicBool::new(false),
            ledger: ledger.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.ledger.release(self.name);
        debug!(registration = self.name, "[Channels] Disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Subscriptions owned by one attempt
#[derive(Default)]
pub struct DisposeBag {
    subscriptions: Vec<Subscription>,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn dispose_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }
}

impl Drop for DisposeBag {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
