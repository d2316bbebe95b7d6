use crate::actor::CLOSE_NO_STATUS;
use crate::node::context::NodeContext;
use crate::protocol::{ToFollowerWebSocketOpen, WebSocketClose, WebSocketFrame};
use crate::types::WebSocketId;

pub(super) fn handle_open(ctx: &NodeContext, open: ToFollowerWebSocketOpen) {
    let websocket_id = WebSocketId::from(open.websocket_id);
    match ctx.find_follower_socket(&websocket_id) {
        Some((_, socket)) => socket.handle_open(),
        None => {
            slog::warn!(ctx.logger, "Open for unknown websocket"; "WebSocketId" => %websocket_id)
        }
    }
}

pub(super) fn handle_message(ctx: &NodeContext, frame: WebSocketFrame) {
    let websocket_id = WebSocketId::from(frame.websocket_id.clone());
    match ctx.find_follower_socket(&websocket_id) {
        Some((_, socket)) => socket.handle_message(frame.into_message()),
        None => {
            slog::warn!(ctx.logger, "Message for unknown websocket"; "WebSocketId" => %websocket_id)
        }
    }
}

pub(super) fn handle_close(ctx: &NodeContext, close: WebSocketClose) {
    let websocket_id = WebSocketId::from(close.websocket_id.clone());
    let Some((kind, _)) = ctx.find_follower_socket(&websocket_id) else {
        slog::warn!(ctx.logger, "Close for unknown websocket"; "WebSocketId" => %websocket_id);
        return;
    };

    // Whoever removes the socket from its table closes it.
    if let Some(socket) = ctx.socket_table(kind).remove(&websocket_id) {
        let code = close.close_code().unwrap_or(CLOSE_NO_STATUS);
        socket.handle_close(code, close.reason.as_deref().unwrap_or_default());
    }
}
