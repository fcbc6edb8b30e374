use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Broker;
use crate::error::StorageError;
use crate::message::{Message, StartOffset, Subscriber};
use crate::storage::{OFFSET_BEGINNING, OFFSET_LATEST, StorageEngine};

/// Outbound queue bound. A consumer that stops reading suspends the pull
/// loop at enqueue, which freezes the cursor; it must not buffer the channel
/// log a second time.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 16;

/// A live subscribe session, handed to the transport layer.
///
/// Messages arrive on an internal bounded queue fed by the session's pull
/// loop; [`Subscription::recv`] drains it. The stream ends (`None`) once the
/// session has been cancelled and the queue is empty. Dropping the handle
/// cancels the session, which is the client-disconnect path.
#[derive(Debug)]
pub struct Subscription {
    subscriber: Subscriber,
    channel: String,
    messages: mpsc::Receiver<Message>,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        subscriber: Subscriber,
        channel: String,
        messages: mpsc::Receiver<Message>,
        token: CancellationToken,
    ) -> Self {
        Self {
            subscriber,
            channel,
            messages,
            token,
        }
    }

    /// Receives the next message, or `None` once the session is over and
    /// the queue has drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// Identity of this session's subscriber.
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Channel this session is subscribed to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Terminates the session. Queued messages remain receivable.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The per-session delivery loop.
///
/// Ticks at the client-supplied cadence, pulls a batch by cursor and feeds
/// it to the outbound queue. Cancellation (client cancel, handle drop or
/// broker shutdown) is observed at every suspension point. Whatever ends the
/// loop, the teardown below it runs exactly once: the subscriber is
/// deregistered, the cursor dropped and the queue closed.
pub(crate) async fn run_pull_loop(
    broker: Arc<Broker>,
    engine: Arc<StorageEngine>,
    subscriber: Subscriber,
    channel: String,
    start: StartOffset,
    pull_interval: Duration,
    outbound: mpsc::Sender<Message>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(pull_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut offset_hint = match start {
        StartOffset::Beginning => OFFSET_BEGINNING,
        StartOffset::Latest => OFFSET_LATEST,
    };

    'session: loop {
        tokio::select! {
            _ = token.cancelled() => break 'session,
            _ = ticker.tick() => {}
        }

        match engine.get_messages(&channel, &subscriber.id, offset_hint) {
            Ok((batch, next_hint)) => {
                offset_hint = next_hint + 1;
                for message in batch {
                    tokio::select! {
                        _ = token.cancelled() => break 'session,
                        sent = outbound.send(message) => {
                            if sent.is_err() {
                                // Receiver dropped without cancelling first.
                                break 'session;
                            }
                        }
                    }
                }
            }
            Err(e @ (StorageError::NoSuchChannel(_) | StorageError::InvalidOffset(_))) => {
                log::error!(
                    "terminating session for subscriber '{}' on channel '{channel}': {e}",
                    subscriber.id
                );
                break 'session;
            }
            Err(e) => {
                // Transient; the next tick retries with the same hint.
                log::warn!("read failed on channel '{channel}', will retry: {e}");
            }
        }
    }

    broker.unsubscribe(&subscriber, &channel);
    drop(outbound);
}
