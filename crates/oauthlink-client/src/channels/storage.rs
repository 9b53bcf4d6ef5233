//! Storage channel - polls the shared store for `<tag>_auth_result`
//!
//! Records are deleted on every read, stale or not, so a leftover record can
//! never be picked up twice.

use std::sync::Arc;
use std::time::Duration;

use oauthlink_core::{
    AuthorizationOutcome, Clock, CorrelationToken, SharedStore, SignalSource, StorageRecord,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{ChannelContext, DeliveryChannel, RegistrationLedger, Signal, SignalSink, Subscription};

/// Result of checking one record read from the store
#[derive(Debug, Clone, PartialEq)]
pub enum RecordVerdict {
    Accept(AuthorizationOutcome),
    /// Older than the recency window
    Stale { age_ms: i64 },
    /// Timestamp further ahead of our clock than the window allows
    FromFuture { age_ms: i64 },
    /// Carries a correlation token that is not ours
    ForeignAttempt,
    Malformed(String),
}

/// Decide whether a raw record belongs to the current attempt.
///
/// A record is accepted when `|now - timestampMs| <= window_ms`; both ends of
/// the window are inclusive.
pub fn evaluate_record(
    raw: &str,
    now_ms: i64,
    window_ms: i64,
    attempt: &CorrelationToken,
) -> RecordVerdict {
    let record: StorageRecord = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(e) => return RecordVerdict::Malformed(e.to_string()),
    };

    if record.attempt.is_some_and(|token| token != *attempt) {
        return RecordVerdict::ForeignAttempt;
    }

    let age_ms = record.age_ms(now_ms);
    if age_ms > window_ms {
        return RecordVerdict::Stale { age_ms };
    }
    if age_ms < -window_ms {
        return RecordVerdict::FromFuture { age_ms };
    }

    RecordVerdict::Accept(record.to_outcome())
}

#[derive(Clone)]
pub struct StorageChannel {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    recency_window: Duration,
}

impl StorageChannel {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        recency_window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            poll_interval,
            recency_window,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl DeliveryChannel for StorageChannel {
    fn source(&self) -> SignalSource {
        SignalSource::Storage
    }

    fn subscribe(
        &self,
        ctx: ChannelContext,
        sink: SignalSink,
        ledger: &RegistrationLedger,
    ) -> Subscription {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let period = self.poll_interval;
        let window_ms = self.recency_window.as_millis() as i64;
        let key = ctx.provider.storage_key();

        Subscription::spawn("storage_poll", ledger, async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let raw = match store.take(&key).await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(key = %key, error = %e, "[StorageChannel] Store read failed");
                        continue;
                    }
                };

                match evaluate_record(&raw, clock.now_ms(), window_ms, &ctx.attempt) {
                    RecordVerdict::Accept(outcome) => {
                        info!(
                            provider = %ctx.provider,
                            success = outcome.is_success(),
                            "[StorageChannel] Outcome received"
                        );
                        sink.deliver(Signal {
                            attempt: ctx.attempt,
                            source: SignalSource::Storage,
                            outcome,
                        });
                        return;
                    }
                    RecordVerdict::Stale { age_ms } | RecordVerdict::FromFuture { age_ms } => {
                        debug!(key = %key, age_ms, "[StorageChannel] Discarded record outside window");
                    }
                    RecordVerdict::ForeignAttempt => {
                        debug!(key = %key, "[StorageChannel] Discarded record for another attempt");
                    }
                    RecordVerdict::Malformed(e) => {
                        warn!(key = %key, error = %e, "[StorageChannel] Discarded malformed record");
                    }
                }
            }
        })
    }
}
