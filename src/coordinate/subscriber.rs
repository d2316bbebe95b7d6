use crate::coordinate::{CoordinateError, NodeSubscription};
use crate::protocol::NodeMessage;

/// Decoding view over a node's subscription.
pub(crate) struct NodeSubscriber {
    subscription: NodeSubscription,
}

impl NodeSubscriber {
    pub fn new(subscription: NodeSubscription) -> Self {
        NodeSubscriber { subscription }
    }

    /// `None` once the store side of the subscription is gone. Malformed frames surface as
    /// `Some(Err(..))` so the caller can log and keep reading.
    pub async fn recv(&mut self) -> Option<Result<NodeMessage, CoordinateError>> {
        let frame = self.subscription.recv().await?;
        Some(NodeMessage::decode_from(&frame).map_err(CoordinateError::from))
    }
}
