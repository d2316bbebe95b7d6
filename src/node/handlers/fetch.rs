use crate::node::context::NodeContext;
use crate::peer::ActorPeer;
use crate::protocol::{self, Body, NodeMessage, ToFollowerFetchResponse, ToLeaderFetch};
use crate::types::{ActorId, NodeId, RequestId};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, Request, Response, StatusCode};
use std::sync::Arc;

fn error_response(
    request_id: String,
    status: StatusCode,
    error: String,
) -> ToFollowerFetchResponse {
    ToFollowerFetchResponse {
        request_id,
        status: u32::from(status.as_u16()),
        headers: Vec::new(),
        body: None,
        error: Some(error),
    }
}

fn build_request(fetch: &ToLeaderFetch) -> Result<Request<Bytes>, http::Error> {
    let method = Method::from_bytes(fetch.method.as_bytes())?;
    let mut request = Request::builder()
        .method(method)
        .uri(fetch.url.as_str())
        .body(fetch.body.clone().unwrap_or_default())?;
    *request.headers_mut() = protocol::headers_from_wire(&fetch.headers);

    Ok(request)
}

fn into_fetch_response(request_id: String, response: Response<Bytes>) -> ToFollowerFetchResponse {
    let (mut parts, body) = response.into_parts();
    // Framing belongs to the follower's transport, not ours.
    parts.headers.remove(CONTENT_LENGTH);
    parts.headers.remove(TRANSFER_ENCODING);

    ToFollowerFetchResponse {
        request_id,
        status: u32::from(parts.status.as_u16()),
        headers: protocol::headers_to_wire(&parts.headers),
        body: (!body.is_empty()).then_some(body),
        error: None,
    }
}

/// Runs a relayed request against the local actor and publishes the outcome to the follower.
pub(super) async fn handle_leader_fetch(
    ctx: Arc<NodeContext>,
    sender: Option<NodeId>,
    fetch: ToLeaderFetch,
) {
    let Some(follower) = sender else {
        slog::error!(
            ctx.logger,
            "Fetch request without a sender node id";
            "RequestId" => &fetch.request_id
        );
        return;
    };
    let actor_id = ActorId::from(fetch.actor_id.clone());
    let request_id = fetch.request_id.clone();

    let response = match ActorPeer::get_leader_actor(&ctx, &actor_id).await {
        None => {
            slog::warn!(ctx.logger, "Fetch for actor not led here"; "ActorId" => %actor_id);
            error_response(request_id, StatusCode::NOT_FOUND, "Actor not found".to_string())
        }
        Some(actor) => match build_request(&fetch) {
            Err(e) => error_response(request_id, StatusCode::BAD_REQUEST, e.to_string()),
            Ok(request) => match ctx.router.fetch(actor, &actor_id, request).await {
                Ok(response) => into_fetch_response(request_id, response),
                Err(e) => {
                    slog::warn!(ctx.logger, "Actor fetch failed: {}", e; "ActorId" => %actor_id);
                    error_response(request_id, StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
        },
    };

    ctx.publish(&follower, NodeMessage::from_body(Body::ToFollowerFetchResponse(response)))
        .await;
}

pub(super) fn handle_fetch_response(ctx: &NodeContext, response: ToFollowerFetchResponse) {
    let request_id = RequestId::from(response.request_id.clone());
    if !ctx.fetch_responses.resolve(&request_id, response) {
        slog::debug!(ctx.logger, "No request waiting on response"; "RequestId" => %request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn relayed_response_drops_framing_headers() {
        let mut response = Response::new(Bytes::from_static(b"hello"));
        let headers = response.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-actor", HeaderValue::from_static("counter"));

        let relayed = into_fetch_response("req".to_string(), response);

        assert_eq!(relayed.status, 200);
        assert_eq!(relayed.body, Some(Bytes::from_static(b"hello")));
        let names: Vec<&str> = relayed.headers.iter().map(|header| header.name.as_str()).collect();
        assert_eq!(names, vec!["x-actor"]);
    }

    #[test]
    fn relayed_request_keeps_method_url_and_headers() {
        let fetch = ToLeaderFetch {
            request_id: "req".into(),
            actor_id: "actor".into(),
            method: "POST".into(),
            url: "/increment?by=2".into(),
            headers: vec![protocol::Header {
                name: "x-trace".into(),
                value: "abc".into(),
            }],
            body: Some(Bytes::from_static(b"{}")),
        };

        let request = build_request(&fetch).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().path(), "/increment");
        assert_eq!(request.uri().query(), Some("by=2"));
        assert_eq!(request.headers()["x-trace"], "abc");
        assert_eq!(request.body(), &Bytes::from_static(b"{}"));
    }
}
