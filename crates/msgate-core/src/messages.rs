//! Wire envelope and RelayService RPC message types.
//!
//! The envelope is the only bit-exact contract with clients: a CBOR map sent
//! as a single binary WebSocket frame. [`decode_envelope`] is the decoder
//! clients use.

use crate::codec::{cbor_decode, cbor_encode};
use crate::error::GateResult;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};

/// Envelope type tags — must match client `ReqIdentifier` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum ReqIdentifier {
    GetNewestSeq = 1001,
    PullMsg = 1002,
    SendMsg = 1003,

    PushMsg = 2001,
    KickOnline = 2002,

    DataError = 3001,
}

impl From<ReqIdentifier> for i32 {
    fn from(r: ReqIdentifier) -> i32 {
        r as i32
    }
}

impl TryFrom<i32> for ReqIdentifier {
    type Error = String;
    fn try_from(v: i32) -> Result<Self, String> {
        match v {
            1001 => Ok(Self::GetNewestSeq),
            1002 => Ok(Self::PullMsg),
            1003 => Ok(Self::SendMsg),
            2001 => Ok(Self::PushMsg),
            2002 => Ok(Self::KickOnline),
            3001 => Ok(Self::DataError),
            _ => Err(format!("unknown req identifier: {v}")),
        }
    }
}

/// The outbound (and inbound) frame record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub req_identifier: ReqIdentifier,
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub err_code: i32,
    #[serde(default)]
    pub err_msg: String,
    #[serde(default, with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// `err_code` of a data-error reply: the client sent something unparseable.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;

impl Envelope {
    /// Wrap a chat message for delivery.
    pub fn push(operation_id: &str, msg: &MsgData) -> GateResult<Self> {
        Ok(Self {
            req_identifier: ReqIdentifier::PushMsg,
            operation_id: operation_id.to_string(),
            err_code: 0,
            err_msg: String::new(),
            data: cbor_encode(msg)?,
        })
    }

    /// Notification sent to a session that is being evicted.
    pub fn kick(err_code: i32, err_msg: &str) -> Self {
        Self {
            req_identifier: ReqIdentifier::KickOnline,
            operation_id: String::new(),
            err_code,
            err_msg: err_msg.to_string(),
            data: Vec::new(),
        }
    }

    /// Reply to an inbound frame that could not be decoded.
    pub fn data_error(reason: impl Into<String>) -> Self {
        Self {
            req_identifier: ReqIdentifier::DataError,
            operation_id: String::new(),
            err_code: ERR_CODE_BAD_REQUEST,
            err_msg: reason.into(),
            data: Vec::new(),
        }
    }
}

/// Encode an envelope as a bare CBOR record (one WS binary frame).
pub fn encode_envelope(envelope: &Envelope) -> GateResult<Vec<u8>> {
    cbor_encode(envelope)
}

/// Decode a WS binary frame into an envelope.
pub fn decode_envelope(frame: &[u8]) -> GateResult<Envelope> {
    cbor_decode(frame)
}

/// Chat session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum SessionType {
    Single = 1,
    Group = 2,
}

impl From<SessionType> for i32 {
    fn from(s: SessionType) -> i32 {
        s as i32
    }
}

impl TryFrom<i32> for SessionType {
    type Error = String;
    fn try_from(v: i32) -> Result<Self, String> {
        match v {
            1 => Ok(Self::Single),
            2 => Ok(Self::Group),
            _ => Err(format!("unknown session type: {v}")),
        }
    }
}

/// A push request from a producer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub operation_id: String,
    pub send_id: String,
    /// Recipient user ID, or for group sessions a space-separated descriptor
    /// whose first token is the addressing target.
    pub recv_id: String,
    pub session_type: SessionType,
    #[serde(default)]
    pub msg_from: i32,
    #[serde(default)]
    pub content_type: i32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub client_msg_id: String,
    #[serde(default)]
    pub server_msg_id: String,
    #[serde(default)]
    pub send_time: i64,
    #[serde(default)]
    pub recv_seq: i64,
    #[serde(default)]
    pub sender_nick_name: String,
    #[serde(default)]
    pub sender_face_url: String,
    /// Platform the message was sent from.
    #[serde(default)]
    pub platform_id: i32,
}

impl PushRequest {
    /// The user whose connections this push fans out to.
    ///
    /// Group pushes only address the first token of `recv_id`; other members
    /// of the descriptor are not reached by this path.
    pub fn addressing_target(&self) -> &str {
        match self.session_type {
            SessionType::Single => &self.recv_id,
            SessionType::Group => self.recv_id.split(' ').next().unwrap_or_default(),
        }
    }
}

/// The message body carried in a push envelope's `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgData {
    pub send_id: String,
    pub recv_id: String,
    pub msg_from: i32,
    pub content_type: i32,
    pub session_type: SessionType,
    pub sender_nick_name: String,
    pub sender_face_url: String,
    pub client_msg_id: String,
    pub server_msg_id: String,
    pub content: String,
    pub seq: i64,
    pub send_time: i64,
    pub sender_platform_id: i32,
}

impl From<&PushRequest> for MsgData {
    fn from(req: &PushRequest) -> Self {
        Self {
            send_id: req.send_id.clone(),
            recv_id: req.recv_id.clone(),
            msg_from: req.msg_from,
            content_type: req.content_type,
            session_type: req.session_type,
            sender_nick_name: req.sender_nick_name.clone(),
            sender_face_url: req.sender_face_url.clone(),
            client_msg_id: req.client_msg_id.clone(),
            server_msg_id: req.server_msg_id.clone(),
            content: req.content.clone(),
            seq: req.recv_seq,
            send_time: req.send_time,
            sender_platform_id: req.platform_id,
        }
    }
}

/// Outcome of one platform-qualified delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum DeliveryCode {
    Delivered,
    NotOnline,
    WriteFailed,
}

impl From<DeliveryCode> for i64 {
    fn from(c: DeliveryCode) -> i64 {
        match c {
            DeliveryCode::Delivered => 0,
            DeliveryCode::NotOnline => -1,
            DeliveryCode::WriteFailed => -2,
        }
    }
}

impl TryFrom<i64> for DeliveryCode {
    type Error = String;
    fn try_from(v: i64) -> Result<Self, String> {
        match v {
            0 => Ok(Self::Delivered),
            -1 => Ok(Self::NotOnline),
            -2 => Ok(Self::WriteFailed),
            _ => Err(format!("unknown result code: {v}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerRecipientResult {
    pub recv_id: String,
    pub platform: Platform,
    pub result_code: DeliveryCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub send_id: String,
    pub results: Vec<PerRecipientResult>,
}

impl PushResponse {
    /// Whether any platform accepted the frame.
    pub fn delivered_anywhere(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.result_code == DeliveryCode::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatusRequest {
    #[serde(default)]
    pub operation_id: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStatus {
    pub platform: Platform,
    pub online: bool,
}

/// Online status of one user. Users with no live connection are omitted from
/// responses entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOnlineStatus {
    pub user_id: String,
    pub is_online: bool,
    pub platforms: Vec<PlatformStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatusResponse {
    pub users: Vec<UserOnlineStatus>,
}

/// A request on the RelayService RPC stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    PushMessage(PushRequest),
    GetOnlineStatus(OnlineStatusRequest),
}

/// A response on the RelayService RPC stream, one per request, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    PushMessage(PushResponse),
    OnlineStatus(OnlineStatusResponse),
    Error { message: String },
}

// ── Helper for bytes serde ───────────────────────────────────────────

mod serde_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf: ByteBuf = Deserialize::deserialize(deserializer)?;
        Ok(buf.0)
    }

    struct ByteBuf(Vec<u8>);

    impl<'de> Deserialize<'de> for ByteBuf {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            struct ByteBufVisitor;

            impl<'de> serde::de::Visitor<'de> for ByteBufVisitor {
                type Value = ByteBuf;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("bytes")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E> {
                    Ok(ByteBuf(v.to_vec()))
                }

                fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                    Ok(ByteBuf(v))
                }

                fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
                where
                    A: serde::de::SeqAccess<'de>,
                {
                    let mut bytes = Vec::new();
                    while let Some(b) = seq.next_element::<u8>()? {
                        bytes.push(b);
                    }
                    Ok(ByteBuf(bytes))
                }
            }

            deserializer.deserialize_any(ByteBufVisitor)
        }
    }
}
