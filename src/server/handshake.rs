//! WebSocket upgrade
//!
//! Accepts the HTTP upgrade and extracts the group and member ids from the
//! request's query string (`?group_id=...&client_id=...`). Requests on another
//! path, or without both ids, are refused before the upgrade completes.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::error::{Error, Result};
use crate::registry::{GroupId, MemberId};

/// Query parameter carrying the group id
pub const GROUP_PARAM: &str = "group_id";

/// Query parameter carrying the member id
pub const MEMBER_PARAM: &str = "client_id";

/// Identity requested by an upgrading connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub group: GroupId,
    pub member: MemberId,
}

/// Why an upgrade request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Request path is not the configured upgrade path
    NotFound(String),
    /// A required query parameter is absent or empty
    MissingParameter(&'static str),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::NotFound(_) => StatusCode::NOT_FOUND,
            Rejection::MissingParameter(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotFound(path) => write!(f, "no WebSocket endpoint at {}", path),
            Rejection::MissingParameter(name) => write!(f, "missing query parameter: {}", name),
        }
    }
}

/// Extract the join request from an upgrade URI
///
/// The first occurrence of each parameter wins; values are percent-decoded.
pub fn parse_join_request(path: &str, uri: &Uri) -> std::result::Result<JoinRequest, Rejection> {
    if uri.path() != path {
        return Err(Rejection::NotFound(uri.path().to_string()));
    }

    let mut group = None;
    let mut member = None;
    let query = uri.query().unwrap_or("");

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            GROUP_PARAM if group.is_none() => group = Some(value.into_owned()),
            MEMBER_PARAM if member.is_none() => member = Some(value.into_owned()),
            _ => {}
        }
    }

    let group = group
        .filter(|g| !g.is_empty())
        .ok_or(Rejection::MissingParameter(GROUP_PARAM))?;
    let member = member
        .filter(|m| !m.is_empty())
        .ok_or(Rejection::MissingParameter(MEMBER_PARAM))?;

    Ok(JoinRequest {
        group: GroupId::new(group),
        member: MemberId::new(member),
    })
}

/// Complete the WebSocket upgrade on `stream`
///
/// Fails with [`Error::HandshakeTimeout`] if the client does not finish the
/// upgrade within `timeout`, and with [`Error::WebSocket`] carrying the HTTP
/// error response if the request was refused.
pub async fn accept<S>(
    stream: S,
    path: &str,
    timeout: Duration,
) -> Result<(WebSocketStream<S>, JoinRequest)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut join = None;

    let callback = |request: &Request, response: Response| {
        match parse_join_request(path, request.uri()) {
            Ok(parsed) => {
                join = Some(parsed);
                Ok(response)
            }
            Err(rejection) => {
                tracing::warn!(
                    uri = %request.uri(),
                    reason = %rejection,
                    "Upgrade request rejected"
                );
                let mut error = ErrorResponse::new(Some(rejection.to_string()));
                *error.status_mut() = rejection.status();
                Err(error)
            }
        }
    };

    let ws = tokio::time::timeout(timeout, accept_hdr_async(stream, callback))
        .await
        .map_err(|_| Error::HandshakeTimeout(timeout))??;

    let join = join.ok_or_else(|| Error::Rejected("upgrade completed without ids".into()))?;
    Ok((ws, join))
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::client_async;
    use tokio_tungstenite::tungstenite;

    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_join_request() {
        let join = parse_join_request("/ws", &uri("/ws?group_id=room1&client_id=alice")).unwrap();

        assert_eq!(join.group, GroupId::new("room1"));
        assert_eq!(join.member, MemberId::new("alice"));
    }

    #[test]
    fn test_parse_percent_decoded() {
        let join =
            parse_join_request("/ws", &uri("/ws?client_id=al%20ice&group_id=room%2F1")).unwrap();

        assert_eq!(join.group.as_str(), "room/1");
        assert_eq!(join.member.as_str(), "al ice");
    }

    #[test]
    fn test_parse_first_value_wins() {
        let join = parse_join_request(
            "/ws",
            &uri("/ws?group_id=a&group_id=b&client_id=x&client_id=y"),
        )
        .unwrap();

        assert_eq!(join.group.as_str(), "a");
        assert_eq!(join.member.as_str(), "x");
    }

    #[test]
    fn test_parse_missing_parameters() {
        assert_eq!(
            parse_join_request("/ws", &uri("/ws?client_id=alice")),
            Err(Rejection::MissingParameter(GROUP_PARAM))
        );
        assert_eq!(
            parse_join_request("/ws", &uri("/ws?group_id=room1&client_id=")),
            Err(Rejection::MissingParameter(MEMBER_PARAM))
        );
        assert_eq!(
            parse_join_request("/ws", &uri("/ws")),
            Err(Rejection::MissingParameter(GROUP_PARAM))
        );
    }

    #[test]
    fn test_parse_wrong_path() {
        let result = parse_join_request("/ws", &uri("/other?group_id=g&client_id=c"));

        assert_eq!(result, Err(Rejection::NotFound("/other".to_string())));
        assert_eq!(result.unwrap_err().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_accept_over_duplex() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            accept(server_io, "/ws", Duration::from_secs(5)).await
        });
        let client = client_async("ws://localhost/ws?group_id=g&client_id=c", client_io).await;

        assert!(client.is_ok());
        let (_ws, join) = server.await.unwrap().unwrap();
        assert_eq!(join.group.as_str(), "g");
        assert_eq!(join.member.as_str(), "c");
    }

    #[tokio::test]
    async fn test_accept_rejects_missing_ids() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            accept(server_io, "/ws", Duration::from_secs(5)).await
        });
        let client = client_async("ws://localhost/ws?group_id=g", client_io).await;

        match client {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
            other => panic!("expected HTTP rejection, got {:?}", other.map(|_| ())),
        }
        assert!(server.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_accept_times_out() {
        let (_client_io, server_io) = tokio::io::duplex(4096);

        let result = accept(server_io, "/ws", Duration::from_millis(20)).await;

        assert!(matches!(result, Err(Error::HandshakeTimeout(_))));
    }
}
