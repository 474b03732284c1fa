//! Wire events exchanged over a WebSocket connection.
//!
//! Events are JSON objects tagged by an `"event"` field, e.g.:
//!
//! ```text
//! {"event":"join","token":"<jwt>"}
//! {"event":"send_message","token":"<jwt>","targetId":"7","payload":"hello"}
//! {"event":"receive_message","sender":"42c","payload":"hello"}
//! ```

use serde::{Deserialize, Serialize};

/// Events a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to the identity carried by `token`.
    Join { token: String },
    /// Route a message to `target_id`, authenticating with `token`.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        token: String,
        target_id: String,
        payload: String,
    },
}

/// Events the server pushes to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message forwarded live from another connected participant.
    /// `sender` is the suffixed wire form of the sender identity.
    ReceiveMessage { sender: String, payload: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let ev: ClientEvent = serde_json::from_str(r#"{"event":"join","token":"abc"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::Join { token } if token == "abc"));
    }

    #[test]
    fn test_parse_send_message() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","token":"abc","targetId":"7","payload":"hi"}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::SendMessage {
                token,
                target_id,
                payload,
            } => {
                assert_eq!(token, "abc");
                assert_eq!(target_id, "7");
                assert_eq!(payload, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_serialize_receive_message() {
        let ev = ServerEvent::ReceiveMessage {
            sender: "42c".into(),
            payload: "hi".into(),
        };
        assert_eq!(
            serde_json::to_string(&ev).unwrap(),
            r#"{"event":"receive_message","sender":"42c","payload":"hi"}"#
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"nope"}"#).is_err());
    }
}
