use crate::node::NodeContext;
use crate::peer::ActorPeer;
use crate::protocol::NodeMessage;
use crate::relay::publish::{self, PendingAck};
use crate::relay::RelayError;
use crate::types::{ActorId, ConnId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// One logical client connection's claim on an actor. Holds a reference on the actor's peer for
/// as long as it lives, which keeps the actor loaded if this node leads it.
pub(crate) struct RelayConn {
    logger: slog::Logger,
    ctx: Arc<NodeContext>,
    actor_id: ActorId,
    conn_id: ConnId,
    peer: Arc<ActorPeer>,
    disposed: AtomicBool,
    // Fires on disconnect, aborting every in-flight publish of this connection.
    cancel: CancellationToken,
}

impl RelayConn {
    pub(crate) async fn start(
        ctx: &Arc<NodeContext>,
        actor_id: &ActorId,
    ) -> Result<Arc<RelayConn>, RelayError> {
        let conn_id = ConnId::generate();
        let logger = ctx
            .logger
            .new(slog::o!("ActorId" => actor_id.to_string(), "ConnId" => conn_id.to_string()));
        slog::debug!(logger, "Starting relay connection");

        let peer = ActorPeer::acquire(ctx, actor_id, &conn_id).await?;
        let conn = Arc::new(RelayConn {
            logger,
            ctx: ctx.clone(),
            actor_id: actor_id.clone(),
            conn_id,
            peer,
            disposed: AtomicBool::new(false),
            cancel: ctx.shutdown.child_token(),
        });

        Ok(conn)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Completes once the connection starts disconnecting.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// With `retry`, waits for the leader's ack and retries with backoff. Without it, sends once
    /// and reports any failure as `LeaderChanged`.
    pub(crate) async fn publish_message_to_leader(
        &self,
        message: NodeMessage,
        retry: bool,
    ) -> Result<(), RelayError> {
        if retry {
            self.check_live()?;
            publish::publish_message_to_leader(&self.ctx, &self.actor_id, message, &self.cancel)
                .await
        } else {
            let pending = self.begin_publish_no_retry(message).await?;
            self.wait_for_ack(pending).await
        }
    }

    /// First half of a no-retry publish. See `publish::begin_publish_no_retry`.
    pub(crate) async fn begin_publish_no_retry(
        &self,
        message: NodeMessage,
    ) -> Result<PendingAck, RelayError> {
        self.check_live()?;
        publish::begin_publish_no_retry(&self.ctx, &self.actor_id, message, &self.cancel).await
    }

    pub(crate) async fn wait_for_ack(&self, pending: PendingAck) -> Result<(), RelayError> {
        pending
            .wait(&self.cancel)
            .await
            .map_err(RelayError::into_leader_changed)
    }

    /// Idempotent. Unless the leader initiated the disconnect, `final_message` is delivered to
    /// the leader first. Dropping the actor reference always comes last, so the actor is still
    /// alive when the close notification arrives.
    pub(crate) async fn disconnect(
        &self,
        from_leader: bool,
        reason: &str,
        final_message: Option<NodeMessage>,
    ) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            slog::debug!(self.logger, "Relay connection already disconnected");
            return;
        }

        slog::debug!(
            self.logger,
            "Disconnecting relay connection";
            "Reason" => reason,
            "FromLeader" => from_leader
        );
        self.cancel.cancel();

        if let (false, Some(message)) = (from_leader, final_message) {
            let cancel = self.ctx.shutdown.child_token();
            let ctx = &self.ctx;
            let result = publish::publish_message_to_leader(ctx, &self.actor_id, message, &cancel);
            if let Err(e) = result.await {
                slog::warn!(self.logger, "Failed to deliver disconnect to leader: {}", e);
            }
        }

        self.peer.remove_connection_reference(&self.conn_id).await;
    }

    fn check_live(&self) -> Result<(), RelayError> {
        if self.is_disposed() {
            slog::warn!(self.logger, "Attempted to publish on a disconnected relay connection");
            Err(RelayError::Disposed)
        } else {
            Ok(())
        }
    }
}
