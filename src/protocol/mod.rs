mod messages;

pub use messages::Encoding;

pub(crate) use messages::node_message::Body;
pub(crate) use messages::Ack;
pub(crate) use messages::Header;
pub(crate) use messages::NodeMessage;
pub(crate) use messages::ToFollowerFetchResponse;
pub(crate) use messages::ToFollowerWebSocketOpen;
pub(crate) use messages::ToLeaderFetch;
pub(crate) use messages::ToLeaderWebSocketOpen;
pub(crate) use messages::WebSocketClose;
pub(crate) use messages::WebSocketFrame;

use crate::actor::WebSocketMessage;
use crate::types::WebSocketId;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use prost::Message;

impl NodeMessage {
    pub(crate) fn from_body(body: Body) -> Self {
        NodeMessage {
            sender_node_id: None,
            message_id: None,
            body: Some(body),
        }
    }

    pub(crate) fn encode_to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    pub(crate) fn decode_from(data: &[u8]) -> Result<Self, prost::DecodeError> {
        NodeMessage::decode(data)
    }
}

impl WebSocketFrame {
    pub(crate) fn new(websocket_id: &WebSocketId, message: WebSocketMessage) -> Self {
        let (data, is_binary) = match message {
            WebSocketMessage::Text(text) => (Bytes::from(text), false),
            WebSocketMessage::Binary(data) => (data, true),
        };

        WebSocketFrame {
            websocket_id: websocket_id.to_string(),
            data,
            is_binary,
        }
    }

    pub(crate) fn into_message(self) -> WebSocketMessage {
        if self.is_binary {
            WebSocketMessage::Binary(self.data)
        } else {
            match String::from_utf8(self.data.to_vec()) {
                Ok(text) => WebSocketMessage::Text(text),
                Err(e) => {
                    WebSocketMessage::Text(String::from_utf8_lossy(e.as_bytes()).into_owned())
                }
            }
        }
    }
}

impl WebSocketClose {
    pub(crate) fn new(
        websocket_id: &WebSocketId,
        code: Option<u16>,
        reason: Option<String>,
    ) -> Self {
        WebSocketClose {
            websocket_id: websocket_id.to_string(),
            code: code.map(u32::from),
            reason,
        }
    }

    /// Codes outside the u16 range are treated as absent.
    pub(crate) fn close_code(&self) -> Option<u16> {
        self.code.and_then(|code| u16::try_from(code).ok())
    }
}

pub(crate) fn headers_to_wire(headers: &HeaderMap) -> Vec<Header> {
    headers
        .iter()
        .map(|(name, value)| Header {
            name: name.as_str().to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
        .collect()
}

/// Drops entries that aren't valid HTTP header names or values.
pub(crate) fn headers_from_wire(headers: &[Header]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes());
        let value = HeaderValue::from_str(&header.value);
        if let (Ok(name), Ok(value)) = (name, value) {
            map.append(name, value);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_survives_the_wire() {
        let mut message = NodeMessage::from_body(Body::ToLeaderWebSocketOpen(ToLeaderWebSocketOpen {
            actor_id: "actor".into(),
            websocket_id: "ws".into(),
            url: "/connect/websocket".into(),
            encoding: Encoding::Cbor as i32,
            conn_params: Some(Bytes::from_static(b"{}")),
            auth_data: None,
            headers: vec![],
        }));
        message.sender_node_id = Some("node-a".into());
        message.message_id = Some("msg-1".into());

        let decoded = NodeMessage::decode_from(&message.encode_to_bytes()).unwrap();
        assert_eq!(decoded, message);
        match decoded.body {
            Some(Body::ToLeaderWebSocketOpen(open)) => {
                assert_eq!(open.encoding(), Encoding::Cbor);
                assert_eq!(open.auth_data, None);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn unknown_encoding_reads_as_json() {
        let open = ToLeaderWebSocketOpen {
            encoding: 7,
            ..ToLeaderWebSocketOpen::default()
        };
        assert_eq!(open.encoding(), Encoding::Json);
        assert_eq!(ToLeaderWebSocketOpen::default().encoding(), Encoding::Json);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(NodeMessage::decode_from(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn frames_keep_text_and_binary_apart() {
        let id = WebSocketId::from("ws");
        let text = WebSocketFrame::new(&id, WebSocketMessage::Text("hi".into()));
        assert!(!text.is_binary);
        assert_eq!(text.into_message(), WebSocketMessage::Text("hi".into()));

        let binary = WebSocketFrame::new(&id, WebSocketMessage::Binary(Bytes::from_static(b"hi")));
        assert!(binary.is_binary);
        assert_eq!(binary.into_message(), WebSocketMessage::Binary(Bytes::from_static(b"hi")));
    }

    #[test]
    fn close_code_out_of_range_is_absent() {
        let close = WebSocketClose {
            websocket_id: "ws".into(),
            code: Some(70_000),
            reason: None,
        };
        assert_eq!(close.close_code(), None);
        assert_eq!(WebSocketClose::new(&"ws".into(), Some(1000), None).close_code(), Some(1000));
    }

    #[test]
    fn invalid_headers_dropped() {
        let headers = headers_from_wire(&[
            Header {
                name: "x-ok".into(),
                value: "yes".into(),
            },
            Header {
                name: "bad header".into(),
                value: "nope".into(),
            },
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers_to_wire(&headers)[0].name, "x-ok");
    }
}
