//! Message channel - listens for `<TAG>_CONNECTED` window messages

use oauthlink_core::{ConnectedMessage, SignalSource};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::{ChannelContext, DeliveryChannel, RegistrationLedger, Signal, SignalSink, Subscription};
use crate::message_bus::WindowMessageBus;

/// Filters by tag only: the sender is the application's own redirect page,
/// so there is no origin check.
#[derive(Clone)]
pub struct MessageChannel {
    bus: WindowMessageBus,
}

impl MessageChannel {
    pub fn new(bus: WindowMessageBus) -> Self {
        Self { bus }
    }
}

impl DeliveryChannel for MessageChannel {
    fn source(&self) -> SignalSource {
        SignalSource::Message
    }

    fn subscribe(
        &self,
        ctx: ChannelContext,
        sink: SignalSink,
        ledger: &RegistrationLedger,
    ) -> Subscription {
        // Subscribe before spawning so nothing posted from here on is missed
        let mut rx = self.bus.subscribe();
        let expected = ctx.provider.message_type();

        Subscription::spawn("message_listener", ledger, async move {
            loop {
                let raw = match rx.recv().await {
                    Ok(raw) => raw,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "[MessageChannel] Listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("[MessageChannel] Message bus closed");
                        return;
                    }
                };

                let Some(message) = ConnectedMessage::parse(&raw, ctx.provider) else {
                    trace!(expected = %expected, "[MessageChannel] Ignoring unrelated message");
                    continue;
                };

                if message.attempt.is_some_and(|token| token != ctx.attempt) {
                    debug!(
                        provider = %ctx.provider,
                        "[MessageChannel] Ignoring message for another attempt"
                    );
                    continue;
                }

                info!(
                    provider = %ctx.provider,
                    success = message.success,
                    "[MessageChannel] Outcome received"
                );
                sink.deliver(Signal {
                    attempt: ctx.attempt,
                    source: SignalSource::Message,
                    outcome: message.to_outcome(),
                });
                return;
            }
        })
    }
}
