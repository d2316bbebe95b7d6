use crate::node::{NodeContext, Pending};
use crate::protocol::NodeMessage;
use crate::relay::RelayError;
use crate::types::{ActorId, MessageId};
use bytes::Bytes;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// An outstanding ack for a message already published to the leader.
pub(crate) struct PendingAck {
    pending: Pending<MessageId, ()>,
    timeout: Duration,
}

impl PendingAck {
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RelayError::Aborted),
            result = tokio::time::timeout(self.timeout, self.pending.wait()) => match result {
                Ok(Some(())) => Ok(()),
                // Replaced or timed out. Either way, no ack is coming for this attempt.
                Ok(None) | Err(_) => Err(RelayError::AckTimeout),
            },
        }
    }
}

/// Stamps the envelope so the receiver acks it back to us.
fn stamp(ctx: &NodeContext, mut message: NodeMessage) -> (MessageId, Bytes) {
    let message_id = MessageId::generate();
    message.sender_node_id = Some(ctx.node_id.to_string());
    message.message_id = Some(message_id.to_string());

    (message_id, message.encode_to_bytes())
}

/// Resolves the leader, registers the ack resolver, then publishes. The resolver is registered
/// first so a fast ack can't be missed.
async fn begin_attempt(
    ctx: &NodeContext,
    actor_id: &ActorId,
    message_id: &MessageId,
    frame: &Bytes,
) -> Result<PendingAck, RelayError> {
    let output = ctx.driver.get_actor_leader(actor_id).await?;
    let actor = output.actor.ok_or(RelayError::ActorNotFound)?;
    let leader_node_id = actor.leader_node_id.ok_or(RelayError::LeaderTransferring)?;

    slog::trace!(
        ctx.logger,
        "Publishing to actor leader";
        "ActorId" => %actor_id,
        "Leader" => %leader_node_id,
        "MessageId" => %message_id
    );

    let pending = ctx.message_acks.register(message_id.clone());
    ctx.driver.publish_to_node(&leader_node_id, frame.clone()).await?;

    Ok(PendingAck {
        pending,
        timeout: ctx.options.message_ack_timeout,
    })
}

async fn attempt(
    ctx: &NodeContext,
    actor_id: &ActorId,
    message_id: &MessageId,
    frame: &Bytes,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let pending = tokio::select! {
        _ = cancel.cancelled() => return Err(RelayError::Aborted),
        result = begin_attempt(ctx, actor_id, message_id, frame) => result?,
    };

    pending.wait(cancel).await
}

/// Publishes toward the leader and waits for the ack, retrying with a fixed backoff. Gives up
/// immediately if the actor doesn't exist or `cancel` fires. Resolves or rejects exactly once.
pub(crate) async fn publish_message_to_leader(
    ctx: &NodeContext,
    actor_id: &ActorId,
    message: NodeMessage,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let (message_id, frame) = stamp(ctx, message);
    let attempts = ctx.options.message_retries + 1;

    let mut attempt_number = 0;
    loop {
        attempt_number += 1;
        let error = match attempt(ctx, actor_id, &message_id, &frame, cancel).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => e,
        };

        slog::warn!(
            ctx.logger,
            "Error publishing message: {}", error;
            "ActorId" => %actor_id,
            "Attempt" => attempt_number
        );
        if attempt_number >= attempts {
            return Err(RelayError::RetriesExhausted {
                attempts,
                last_error: error.to_string(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Aborted),
            _ = tokio::time::sleep(ctx.options.message_retry_backoff) => {}
        }
    }
}

/// Single-shot publish for live frames. Returns once the frame is handed to the store; the
/// returned ack can be awaited separately so consecutive frames don't serialize on round trips.
/// Every failure surfaces as `LeaderChanged`.
pub(crate) async fn begin_publish_no_retry(
    ctx: &NodeContext,
    actor_id: &ActorId,
    message: NodeMessage,
    cancel: &CancellationToken,
) -> Result<PendingAck, RelayError> {
    let (message_id, frame) = stamp(ctx, message);

    tokio::select! {
        _ = cancel.cancelled() => Err(RelayError::Aborted),
        result = begin_attempt(ctx, actor_id, &message_id, &frame) => {
            result.map_err(RelayError::into_leader_changed)
        }
    }
}
