//! Translation of queued chat events into push requests.
//!
//! The queue consumer hands over one JSON-encoded event per message. A
//! malformed event is unrecoverable by redelivery, so callers drop it rather
//! than retry; it never reaches the RelayService.

use crate::error::{GateError, GateResult};
use crate::messages::{PushRequest, SessionType};
use serde::Deserialize;

/// A chat event as produced by the message service onto the push topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    #[serde(default)]
    pub operation_id: String,
    pub send_id: String,
    pub recv_id: String,
    pub session_type: i32,
    #[serde(default)]
    pub msg_from: i32,
    #[serde(default)]
    pub content_type: i32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub client_msg_id: String,
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub send_time: i64,
    #[serde(default)]
    pub recv_seq: i64,
    #[serde(default)]
    pub sender_nick_name: String,
    #[serde(default)]
    pub sender_face_url: String,
    #[serde(default)]
    pub platform_id: i32,
}

impl TryFrom<ChatEvent> for PushRequest {
    type Error = GateError;

    fn try_from(ev: ChatEvent) -> GateResult<Self> {
        let session_type = SessionType::try_from(ev.session_type).map_err(GateError::InvalidMessage)?;
        if ev.recv_id.trim().is_empty() {
            return Err(GateError::InvalidMessage("empty recv_id".into()));
        }

        Ok(PushRequest {
            operation_id: ev.operation_id,
            send_id: ev.send_id,
            recv_id: ev.recv_id,
            session_type,
            msg_from: ev.msg_from,
            content_type: ev.content_type,
            content: ev.content,
            client_msg_id: ev.client_msg_id,
            server_msg_id: ev.msg_id,
            send_time: ev.send_time,
            recv_seq: ev.recv_seq,
            sender_nick_name: ev.sender_nick_name,
            sender_face_url: ev.sender_face_url,
            platform_id: ev.platform_id,
        })
    }
}

/// Decode one queued event into a push request.
pub fn translate_event(raw: &[u8]) -> GateResult<PushRequest> {
    let event: ChatEvent = serde_json::from_slice(raw)
        .map_err(|e| GateError::InvalidMessage(format!("malformed chat event: {e}")))?;
    PushRequest::try_from(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_complete_event() {
        let raw = br#"{
            "operation_id": "op-9",
            "send_id": "alice",
            "recv_id": "bob",
            "session_type": 1,
            "content_type": 101,
            "content": "hi",
            "msg_id": "srv-1",
            "client_msg_id": "cli-1",
            "platform_id": 5,
            "recv_seq": 3,
            "send_time": 42
        }"#;
        let req = translate_event(raw).unwrap();
        assert_eq!(req.server_msg_id, "srv-1");
        assert_eq!(req.session_type, SessionType::Single);
        assert_eq!(req.recv_seq, 3);
        assert_eq!(req.platform_id, 5);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(translate_event(b"{not json").is_err());
        assert!(translate_event(br#"{"send_id":"a"}"#).is_err());
    }

    #[test]
    fn unknown_session_type_is_rejected() {
        let raw = br#"{"send_id":"a","recv_id":"b","session_type":9}"#;
        assert!(translate_event(raw).is_err());
    }

    #[test]
    fn blank_recipient_is_rejected() {
        let raw = br#"{"send_id":"a","recv_id":"  ","session_type":1}"#;
        assert!(translate_event(raw).is_err());
    }
}
