//! Hub wire types: named operations, request/response bodies and framing.
//!
//! Every hub call carries one argument, the request body encoded as a JSON
//! string. Responses come back the same way. The frames themselves are JSON
//! text messages:
//!
//! ```text
//! client → hub   {"H": "broadcast", "M": "Authorize", "A": ["{…}"], "I": 1}
//! hub → client   {"I": 1, "R": "{\"success\":true}"}
//! hub → client   {"I": 1, "E": "room token expired"}
//! ```
//!
//! Frames without an `I` field are server pushes; the broadcaster has no use
//! for them.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Remote operations exposed by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    Authorize,
    AppendSession,
    RemoveSession,
    UpdateSessionContent,
    UpdateSessionInfo,
    UpdateSessionCursor,
}

impl HubMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "Authorize",
            Self::AppendSession => "AppendSession",
            Self::RemoveSession => "RemoveSession",
            Self::UpdateSessionContent => "UpdateSessionContent",
            Self::UpdateSessionInfo => "UpdateSessionInfo",
            Self::UpdateSessionCursor => "UpdateSessionCursor",
        }
    }

    /// Calls whose outcome feeds the handshake. Everything else is
    /// fire-and-forget.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Authorize | Self::AppendSession)
    }

    /// Calls whose reply is tracked. Session pushes are never answered.
    pub fn awaits_reply(&self) -> bool {
        self.is_handshake() || matches!(self, Self::RemoveSession)
    }
}

impl fmt::Display for HubMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque session handle issued by the hub on registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ───────────────────────────────────────────────────────────────────
// Request / response bodies
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub user_name: String,
    pub access_token: String,
    pub room_name: String,
    pub room_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendSessionRequest {
    pub filename: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendSessionResponse {
    pub success: bool,
    #[serde(default)]
    pub id: Option<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveSessionRequest {
    pub id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSessionContentRequest {
    pub id: SessionId,
    pub data: Vec<UpdateOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSessionInfoRequest {
    pub id: SessionId,
    pub filename: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSessionCursorRequest {
    pub id: SessionId,
    pub anchor: CursorPosition,
    pub active: CursorPosition,
    #[serde(rename = "type")]
    pub kind: CursorKind,
}

/// Content type sent with the placeholder registration. The real type is
/// pushed by the bootstrap resync right after.
pub const PLACEHOLDER_CONTENT_TYPE: &str = "plaintext";

/// Content type for a document with the given editor language id.
pub fn code_content_type(language_id: &str) -> String {
    format!("code:{language_id}")
}

// ───────────────────────────────────────────────────────────────────
// Update operations
// ───────────────────────────────────────────────────────────────────

/// Serialise a closed enum as its numeric code.
macro_rules! numeric_serde {
    ($ty:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        impl $ty {
            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = u8::deserialize(deserializer)?;
                Self::from_code(code).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!("unknown ", stringify!($ty), " code {}"),
                        code
                    ))
                })
            }
        }
    };
}

/// Kind of a single update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateKind {
    Insert = 0,
    Delete = 1,
    Replace = 2,
    Append = 3,
    /// Clear modified markers on the viewer side
    RemoveMarker = 4,
    /// Drop all viewer state before a full resync
    ResetAll = 5,
}

numeric_serde!(UpdateKind {
    Insert = 0,
    Delete = 1,
    Replace = 2,
    Append = 3,
    RemoveMarker = 4,
    ResetAll = 5,
});

/// A block of text carried by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub modified: bool,
}

impl Line {
    pub fn modified(text: impl Into<String>) -> Self {
        Self { text: text.into(), modified: true }
    }

    pub fn unmodified(text: impl Into<String>) -> Self {
        Self { text: text.into(), modified: false }
    }
}

/// One step of an update batch. Viewers apply a batch strictly in `order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOperation {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(
        rename = "data",
        serialize_with = "lines_or_null",
        deserialize_with = "nullable_lines"
    )]
    pub lines: Vec<Line>,
    #[serde(rename = "pos")]
    pub position: usize,
    #[serde(rename = "len")]
    pub length: usize,
    pub order: usize,
}

impl UpdateOperation {
    /// Operation with no payload (markers, resets).
    pub fn bare(kind: UpdateKind) -> Self {
        Self { kind, lines: Vec::new(), position: 0, length: 0, order: 0 }
    }
}

fn lines_or_null<S: Serializer>(lines: &[Line], serializer: S) -> Result<S::Ok, S::Error> {
    if lines.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(lines)
    }
}

fn nullable_lines<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Line>, D::Error> {
    Option::<Vec<Line>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ───────────────────────────────────────────────────────────────────
// Cursor
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    pub pos: usize,
}

impl CursorPosition {
    pub fn new(line: usize, pos: usize) -> Self {
        Self { line, pos }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CursorKind {
    Point = 0,
    Select = 1,
}

numeric_serde!(CursorKind { Point = 0, Select = 1 });

/// Caret or selection of the broadcast editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub anchor: CursorPosition,
    pub active: CursorPosition,
    pub kind: CursorKind,
}

impl CursorState {
    /// Classify a selection: `Point` iff anchor and active coincide.
    pub fn from_selection(anchor: CursorPosition, active: CursorPosition) -> Self {
        let kind = if anchor == active { CursorKind::Point } else { CursorKind::Select };
        Self { anchor, active, kind }
    }
}

// ───────────────────────────────────────────────────────────────────
// Framing
// ───────────────────────────────────────────────────────────────────

/// A hub call handed to the transport. `argument` is the encoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub id: u64,
    pub method: HubMethod,
    pub argument: String,
}

impl Invocation {
    /// Encode `request` as the single call argument.
    pub fn new<T: Serialize>(id: u64, method: HubMethod, request: &T) -> Result<Self, HubError> {
        let argument = serde_json::to_string(request).map_err(|e| HubError::Serialization {
            method,
            reason: e.to_string(),
        })?;
        Ok(Self { id, method, argument })
    }

    /// Wire frame for this call on the given hub.
    pub fn to_frame(&self, hub: &str) -> InvocationFrame {
        InvocationFrame {
            hub: hub.to_string(),
            method: self.method.as_str().to_string(),
            args: vec![self.argument.clone()],
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFrame {
    #[serde(rename = "H")]
    pub hub: String,
    #[serde(rename = "M")]
    pub method: String,
    #[serde(rename = "A")]
    pub args: Vec<String>,
    #[serde(rename = "I")]
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionFrame {
    #[serde(rename = "I")]
    pub id: u64,
    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionFrame {
    /// Parse a text frame from the hub. `Ok(None)` for server pushes.
    pub fn decode(text: &str) -> Result<Option<Self>, HubError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| HubError::Transport(format!("bad frame: {e}")))?;
        if value.get("I").is_none() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HubError::Transport(format!("bad completion frame: {e}")))
    }

    /// Reply payload, or the hub's error message.
    pub fn into_outcome(self) -> Result<String, String> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(String::new()),
        }
    }
}

/// Decode a reply body for `method`.
pub fn decode_response<T: DeserializeOwned>(method: HubMethod, raw: &str) -> Result<T, HubError> {
    serde_json::from_str(raw).map_err(|e| HubError::Malformed {
        method,
        reason: e.to_string(),
    })
}

/// Failures talking to the hub. None of them escape the core: they become
/// phase transitions, notices and log lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("{0} was rejected by the hub")]
    Rejected(HubMethod),

    #[error("malformed {method} response: {reason}")]
    Malformed { method: HubMethod, reason: String },

    #[error("{method} failed: {message}")]
    Remote { method: HubMethod, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not encode {method} request: {reason}")]
    Serialization { method: HubMethod, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_kind_codes() {
        assert_eq!(UpdateKind::Insert.code(), 0);
        assert_eq!(UpdateKind::Replace.code(), 2);
        assert_eq!(UpdateKind::ResetAll.code(), 5);
        assert_eq!(UpdateKind::from_code(4), Some(UpdateKind::RemoveMarker));
        assert_eq!(UpdateKind::from_code(6), None);
    }

    #[test]
    fn test_marker_operation_serializes_null_data() {
        let op = UpdateOperation::bare(UpdateKind::RemoveMarker);
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value, json!({"type": 4, "data": null, "pos": 0, "len": 0, "order": 0}));
    }

    #[test]
    fn test_replace_operation_wire_shape() {
        let op = UpdateOperation {
            kind: UpdateKind::Replace,
            lines: vec![Line::modified("a\nb")],
            position: 5,
            length: 2,
            order: 0,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "type": 2,
                "data": [{"text": "a\nb", "modified": true}],
                "pos": 5,
                "len": 2,
                "order": 0
            })
        );

        let back: UpdateOperation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_null_data_decodes_to_empty_lines() {
        let op: UpdateOperation =
            serde_json::from_str(r#"{"type":5,"data":null,"pos":0,"len":0,"order":0}"#).unwrap();
        assert_eq!(op.kind, UpdateKind::ResetAll);
        assert!(op.lines.is_empty());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = serde_json::from_str::<UpdateOperation>(
            r#"{"type":9,"data":null,"pos":0,"len":0,"order":0}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cursor_classification() {
        let here = CursorPosition::new(3, 7);
        assert_eq!(CursorState::from_selection(here, here).kind, CursorKind::Point);

        let there = CursorPosition::new(4, 0);
        let cursor = CursorState::from_selection(here, there);
        assert_eq!(cursor.kind, CursorKind::Select);
        assert_eq!(cursor.anchor, here);
        assert_eq!(cursor.active, there);
    }

    #[test]
    fn test_cursor_request_wire_shape() {
        let request = UpdateSessionCursorRequest {
            id: SessionId::new("s-1"),
            anchor: CursorPosition::new(1, 2),
            active: CursorPosition::new(1, 2),
            kind: CursorKind::Point,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "s-1",
                "anchor": {"line": 1, "pos": 2},
                "active": {"line": 1, "pos": 2},
                "type": 0
            })
        );
    }

    #[test]
    fn test_authorize_request_field_names() {
        let request = AuthorizeRequest {
            user_name: "yuki".into(),
            access_token: "tok".into(),
            room_name: "lobby".into(),
            room_token: "secret".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["user_name"], "yuki");
        assert_eq!(value["access_token"], "tok");
        assert_eq!(value["room_name"], "lobby");
        assert_eq!(value["room_token"], "secret");
    }

    #[test]
    fn test_invocation_frame_double_encodes_argument() {
        let invocation = Invocation::new(
            7,
            HubMethod::RemoveSession,
            &RemoveSessionRequest { id: SessionId::new("abc") },
        )
        .unwrap();
        let frame = invocation.to_frame("broadcast");
        let text = serde_json::to_string(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["H"], "broadcast");
        assert_eq!(value["M"], "RemoveSession");
        assert_eq!(value["I"], 7);
        assert_eq!(value["A"][0], r#"{"id":"abc"}"#);
    }

    #[test]
    fn test_completion_frame_decode() {
        let ok = CompletionFrame::decode(r#"{"I":3,"R":"{\"success\":true}"}"#).unwrap().unwrap();
        assert_eq!(ok.id, 3);
        assert_eq!(ok.into_outcome(), Ok(r#"{"success":true}"#.to_string()));

        let err = CompletionFrame::decode(r#"{"I":4,"E":"nope"}"#).unwrap().unwrap();
        assert_eq!(err.into_outcome(), Err("nope".to_string()));

        assert!(CompletionFrame::decode(r#"{"M":"viewerJoined"}"#).unwrap().is_none());
        assert!(CompletionFrame::decode("not json").is_err());
    }

    #[test]
    fn test_decode_response_malformed() {
        let result: Result<AuthorizeResponse, _> = decode_response(HubMethod::Authorize, "{}");
        assert!(matches!(
            result,
            Err(HubError::Malformed { method: HubMethod::Authorize, .. })
        ));

        let parsed: AppendSessionResponse =
            decode_response(HubMethod::AppendSession, r#"{"success":true,"id":"x1"}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.id, Some(SessionId::new("x1")));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(code_content_type("rust"), "code:rust");
        assert_eq!(PLACEHOLDER_CONTENT_TYPE, "plaintext");
    }
}
