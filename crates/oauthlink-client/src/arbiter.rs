//! Resolution Arbiter
//!
//! Races the delivery channels, the popup-closed poll and the attempt
//! deadline. The first valid input claims the attempt's single resolution;
//! every registration is disposed before the verdict is returned.

use std::sync::Arc;
use std::time::Duration;

use oauthlink_core::{CancelReason, ConnectionAttempt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channels::{
    ArbiterInput, ChannelContext, DeliveryChannel, DisposeBag, RegistrationLedger, Signal,
    SignalSink, Subscription,
};
use crate::popup::PopupWatch;

#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterVerdict {
    /// A channel delivered an outcome for this attempt
    Delivered(Signal),
    Cancelled(CancelReason),
    /// Abandoned from outside (superseded or torn down)
    Aborted,
}

pub struct ResolutionArbiter {
    ledger: RegistrationLedger,
}

impl ResolutionArbiter {
    pub fn new(ledger: RegistrationLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &RegistrationLedger {
        &self.ledger
    }

    /// Start every channel plus the closed poll, and wait for the first
    /// terminal input.
    pub async fn run(
        &self,
        attempt: &ConnectionAttempt,
        channels: &[Arc<dyn DeliveryChannel>],
        popup: PopupWatch,
        poll_interval: Duration,
        timeout: Duration,
        abort: &CancellationToken,
    ) -> ArbiterVerdict {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ChannelContext {
            provider: attempt.provider,
            attempt: attempt.token,
        };

        let mut bag = DisposeBag::new();
        for channel in channels {
            debug!(source = channel.source().as_str(), "[Arbiter] Starting channel");
            bag.push(channel.subscribe(ctx, SignalSink::new(tx.clone()), &self.ledger));
        }
        bag.push(closed_poll(
            popup,
            poll_interval,
            SignalSink::new(tx),
            &self.ledger,
        ));

        let verdict = self.race(attempt, &mut rx, timeout, abort).await;
        bag.dispose_all();
        verdict
    }

    async fn race(
        &self,
        attempt: &ConnectionAttempt,
        rx: &mut mpsc::UnboundedReceiver<ArbiterInput>,
        timeout: Duration,
        abort: &CancellationToken,
    ) -> ArbiterVerdict {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut inputs_open = true;

        loop {
            tokio::select! {
                biased;

                _ = abort.cancelled() => {
                    attempt.try_resolve();
                    debug!(attempt = %attempt.token.short(), "[Arbiter] Aborted");
                    return ArbiterVerdict::Aborted;
                }

                input = rx.recv(), if inputs_open => match input {
                    Some(ArbiterInput::Delivered(signal)) => {
                        if let Some(verdict) = accept(attempt, signal) {
                            return verdict;
                        }
                    }
                    Some(ArbiterInput::PopupClosed) => {
                        return settle_on_close(attempt, rx);
                    }
                    None => {
                        // Every registration finished without a verdict; only
                        // the deadline or an abort can end the attempt now
                        inputs_open = false;
                    }
                },

                _ = &mut deadline => {
                    attempt.try_resolve();
                    info!(
                        provider = %attempt.provider,
                        attempt = %attempt.token.short(),
                        timeout_secs = timeout.as_secs(),
                        "[Arbiter] Attempt timed out"
                    );
                    return ArbiterVerdict::Cancelled(CancelReason::TimedOut);
                }
            }
        }
    }
}

fn accept(attempt: &ConnectionAttempt, signal: Signal) -> Option<ArbiterVerdict> {
    if !attempt.owns(Some(&signal.attempt)) {
        debug!(
            attempt = %attempt.token.short(),
            signal_attempt = %signal.attempt.short(),
            "[Arbiter] Ignoring signal from another attempt"
        );
        return None;
    }
    if !attempt.try_resolve() {
        return None;
    }
    info!(
        provider = %attempt.provider,
        attempt = %attempt.token.short(),
        source = signal.source.as_str(),
        success = signal.outcome.is_success(),
        "[Arbiter] Resolved"
    );
    Some(ArbiterVerdict::Delivered(signal))
}

/// The popup is gone. An outcome that was already delivered still wins.
fn settle_on_close(
    attempt: &ConnectionAttempt,
    rx: &mut mpsc::UnboundedReceiver<ArbiterInput>,
) -> ArbiterVerdict {
    while let Ok(input) = rx.try_recv() {
        if let ArbiterInput::Delivered(signal) = input {
            if let Some(verdict) = accept(attempt, signal) {
                return verdict;
            }
        }
    }

    attempt.try_resolve();
    info!(
        provider = %attempt.provider,
        attempt = %attempt.token.short(),
        "[Arbiter] Popup closed before an outcome arrived"
    );
    ArbiterVerdict::Cancelled(CancelReason::PopupClosed)
}

fn closed_poll(
    popup: PopupWatch,
    period: Duration,
    sink: SignalSink,
    ledger: &RegistrationLedger,
) -> Subscription {
    Subscription::spawn("closed_poll", ledger, async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if popup.is_closed() {
                sink.popup_closed();
                return;
            }
        }
    })
}
