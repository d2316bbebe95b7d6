use bytes::Bytes;

/// Envelope for everything published between nodes. When both `sender_node_id` and
/// `message_id` are present the receiver acks the message back to the sender.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct NodeMessage {
    #[prost(string, optional, tag = "1")]
    pub sender_node_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub message_id: Option<String>,
    #[prost(oneof = "node_message::Body", tags = "3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub body: Option<node_message::Body>,
}

pub(crate) mod node_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub(crate) enum Body {
        #[prost(message, tag = "3")]
        Ack(super::Ack),
        #[prost(message, tag = "4")]
        ToLeaderFetch(super::ToLeaderFetch),
        #[prost(message, tag = "5")]
        ToFollowerFetchResponse(super::ToFollowerFetchResponse),
        #[prost(message, tag = "6")]
        ToLeaderWebSocketOpen(super::ToLeaderWebSocketOpen),
        #[prost(message, tag = "7")]
        ToLeaderWebSocketMessage(super::WebSocketFrame),
        #[prost(message, tag = "8")]
        ToLeaderWebSocketClose(super::WebSocketClose),
        #[prost(message, tag = "9")]
        ToFollowerWebSocketOpen(super::ToFollowerWebSocketOpen),
        #[prost(message, tag = "10")]
        ToFollowerWebSocketMessage(super::WebSocketFrame),
        #[prost(message, tag = "11")]
        ToFollowerWebSocketClose(super::WebSocketClose),
    }

    impl Body {
        pub(crate) fn kind(&self) -> &'static str {
            match self {
                Body::Ack(_) => "ack",
                Body::ToLeaderFetch(_) => "to_leader_fetch",
                Body::ToFollowerFetchResponse(_) => "to_follower_fetch_response",
                Body::ToLeaderWebSocketOpen(_) => "to_leader_websocket_open",
                Body::ToLeaderWebSocketMessage(_) => "to_leader_websocket_message",
                Body::ToLeaderWebSocketClose(_) => "to_leader_websocket_close",
                Body::ToFollowerWebSocketOpen(_) => "to_follower_websocket_open",
                Body::ToFollowerWebSocketMessage(_) => "to_follower_websocket_message",
                Body::ToFollowerWebSocketClose(_) => "to_follower_websocket_close",
            }
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct Ack {
    #[prost(string, tag = "1")]
    pub message_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct Header {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ToLeaderFetch {
    #[prost(string, tag = "1")]
    pub request_id: String,
    #[prost(string, tag = "2")]
    pub actor_id: String,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(string, tag = "4")]
    pub url: String,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<Header>,
    #[prost(bytes = "bytes", optional, tag = "6")]
    pub body: Option<Bytes>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ToFollowerFetchResponse {
    #[prost(string, tag = "1")]
    pub request_id: String,
    #[prost(uint32, tag = "2")]
    pub status: u32,
    #[prost(message, repeated, tag = "3")]
    pub headers: Vec<Header>,
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub body: Option<Bytes>,
    #[prost(string, optional, tag = "5")]
    pub error: Option<String>,
}

/// Wire encoding the client negotiated for the actor protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Encoding {
    Json = 0,
    Cbor = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ToLeaderWebSocketOpen {
    #[prost(string, tag = "1")]
    pub actor_id: String,
    #[prost(string, tag = "2")]
    pub websocket_id: String,
    #[prost(string, tag = "3")]
    pub url: String,
    #[prost(enumeration = "Encoding", tag = "4")]
    pub encoding: i32,
    #[prost(bytes = "bytes", optional, tag = "5")]
    pub conn_params: Option<Bytes>,
    #[prost(bytes = "bytes", optional, tag = "6")]
    pub auth_data: Option<Bytes>,
    #[prost(message, repeated, tag = "7")]
    pub headers: Vec<Header>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ToFollowerWebSocketOpen {
    #[prost(string, tag = "1")]
    pub websocket_id: String,
}

/// One data frame. Same shape in both directions.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WebSocketFrame {
    #[prost(string, tag = "1")]
    pub websocket_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub data: Bytes,
    #[prost(bool, tag = "3")]
    pub is_binary: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WebSocketClose {
    #[prost(string, tag = "1")]
    pub websocket_id: String,
    #[prost(uint32, optional, tag = "2")]
    pub code: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub reason: Option<String>,
}
