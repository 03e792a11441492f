//! Wire envelopes for the Amaran Desktop protocol.
//!
//! Outbound requests are shaped by an [`EncodingPolicy`] chosen once from
//! the negotiated protocol version. Inbound frames are plain JSON objects,
//! classified into responses, push events, or anything else.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::token;

// ── Protocol constants ───────────────────────────────────────────────

/// Version emitted in current-format envelopes.
pub const CURRENT_VERSION: u32 = 2;

/// Version emitted in legacy envelopes.
pub const LEGACY_VERSION: u32 = 0;

/// Action sent on every open to learn the server's protocol version.
pub const VERSION_QUERY_ACTION: &str = "get_protocol_versions";

// ── Request ──────────────────────────────────────────────────────────

/// A protocol-agnostic request: what to do, to which node, with what args.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub node_id: Option<String>,
    pub action: String,
    pub args: Option<Map<String, Value>>,
}

impl Request {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            node_id: None,
            action: action.into(),
            args: None,
        }
    }

    /// Address the request to a device or scene.
    pub fn node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Attach arguments. An absent argument map is sent as `{}`.
    pub fn args(mut self, args: Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }
}

// ── Outbound envelopes ───────────────────────────────────────────────

/// Envelope for protocol version 2 and for the pre-negotiation state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentEnvelope {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub client_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub action: String,
    pub args: Map<String, Value>,
    pub token: String,
}

/// Envelope for protocol version 0. No token, no request id; the action
/// travels in `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyEnvelope {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub args: Map<String, Value>,
}

/// A fully framed outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireMessage {
    Current(CurrentEnvelope),
    Legacy(LegacyEnvelope),
}

impl WireMessage {
    /// Serialize to the text frame sent over the socket.
    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::Current(env) => env.version,
            Self::Legacy(env) => env.version,
        }
    }
}

// ── Encoding policy ──────────────────────────────────────────────────

/// How requests are framed for a given protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingPolicy {
    /// Version 2 envelope with token and request id.
    #[default]
    Current,
    /// Version 0 envelope with legacy action names.
    Legacy,
}

impl EncodingPolicy {
    /// Select the policy for a negotiated version.
    ///
    /// An unknown version optimistically uses the current format so that the
    /// version query itself goes out in the modern envelope.
    pub fn for_version(version: Option<u32>) -> Self {
        match version {
            None => Self::Current,
            Some(v) if v >= CURRENT_VERSION => Self::Current,
            Some(_) => Self::Legacy,
        }
    }

    /// Frame `request` for the wire.
    ///
    /// `sequence` is advanced only for current-format envelopes.
    pub fn encode(
        self,
        client_id: &str,
        sequence: &AtomicU64,
        request: &Request,
    ) -> Result<WireMessage, Error> {
        let args = request.args.clone().unwrap_or_default();

        match self {
            Self::Current => {
                let n = sequence.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(WireMessage::Current(CurrentEnvelope {
                    version: CURRENT_VERSION,
                    kind: "request",
                    client_id: client_id.to_owned(),
                    request_id: format!("req-{n}"),
                    node_id: request.node_id.clone(),
                    action: request.action.clone(),
                    args,
                    token: token::generate_token()?,
                }))
            }
            Self::Legacy => Ok(WireMessage::Legacy(LegacyEnvelope {
                version: LEGACY_VERSION,
                kind: legacy_action(&request.action).to_owned(),
                client_id: client_id.to_owned(),
                node_id: request.node_id.clone(),
                args,
            })),
        }
    }
}

/// Map a current action name to its version-0 `type` string.
pub fn legacy_action(action: &str) -> &str {
    match action {
        "increase_intensity" => "increment_intensity",
        "increase_cct" => "increment_cct",
        other => other,
    }
}

// ── Inbound frames ───────────────────────────────────────────────────

/// A reply to a request: `{type:"response", client_id, action, code, data}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub client_id: Option<String>,
    pub action: Option<String>,
    pub code: Option<i64>,
    pub node_id: Option<String>,
    pub data: Value,
    /// The complete frame, so callers can inspect anything else the server sent.
    pub raw: Value,
}

impl Response {
    /// `code == 0`. A missing code is not success.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A push notification: `{type:"event", event, node_id, data}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub event: String,
    pub node_id: Option<String>,
    pub data: Value,
    pub raw: Value,
}

/// Classification of a decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Event(PushEvent),
    /// Valid JSON that is neither a response nor an event.
    Unsolicited(Value),
}

/// A structurally decoded inbound frame, not yet classified.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    raw: Value,
}

impl InboundFrame {
    /// Decode a text frame. Only JSON syntax is checked here.
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map(|raw| Self { raw })
            .map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.to_owned(),
            })
    }

    /// The `version` field, when present and a whole non-negative number.
    pub fn version(&self) -> Option<u32> {
        match &self.raw["version"] {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(whole),
            _ => None,
        }
        .and_then(|v| u32::try_from(v).ok())
    }

    pub fn classify(self) -> Inbound {
        let kind = str_field(&self.raw, "type");
        match kind.as_deref() {
            Some("response") => Inbound::Response(Response {
                client_id: str_field(&self.raw, "client_id"),
                action: str_field(&self.raw, "action"),
                code: self.raw["code"].as_i64(),
                node_id: str_field(&self.raw, "node_id"),
                data: self.raw["data"].clone(),
                raw: self.raw,
            }),
            Some("event") => match str_field(&self.raw, "event") {
                Some(event) => Inbound::Event(PushEvent {
                    event,
                    node_id: str_field(&self.raw, "node_id"),
                    data: self.raw["data"].clone(),
                    raw: self.raw,
                }),
                None => Inbound::Unsolicited(self.raw),
            },
            _ => Inbound::Unsolicited(self.raw),
        }
    }
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw[key].as_str().map(String::from)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn whole(v: f64) -> Option<u64> {
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX)).then(|| v as u64)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn encode(policy: EncodingPolicy, request: &Request) -> Value {
        let seq = AtomicU64::new(0);
        let msg = policy.encode("amaran-1", &seq, request).unwrap();
        serde_json::from_str(&msg.to_text().unwrap()).unwrap()
    }

    #[test]
    fn unknown_and_modern_versions_select_current_policy() {
        assert_eq!(EncodingPolicy::for_version(None), EncodingPolicy::Current);
        assert_eq!(EncodingPolicy::for_version(Some(2)), EncodingPolicy::Current);
        assert_eq!(EncodingPolicy::for_version(Some(7)), EncodingPolicy::Current);
        assert_eq!(EncodingPolicy::for_version(Some(0)), EncodingPolicy::Legacy);
        assert_eq!(EncodingPolicy::for_version(Some(1)), EncodingPolicy::Legacy);
    }

    #[test]
    fn legacy_renames_increase_actions() {
        for (action, expected) in [
            ("increase_intensity", "increment_intensity"),
            ("increase_cct", "increment_cct"),
        ] {
            let frame = encode(EncodingPolicy::Legacy, &Request::new(action).node("N"));
            assert_eq!(frame["type"], expected);
        }
    }

    #[test]
    fn legacy_passes_unmapped_actions_through() {
        for action in ["set_sleep", "toggle_sleep", "set_cct", "get_device_list"] {
            let frame = encode(EncodingPolicy::Legacy, &Request::new(action));
            assert_eq!(frame["type"], action);
        }
    }

    #[test]
    fn legacy_envelope_shape() {
        let request = Request::new("set_intensity")
            .node("light-1")
            .args(args(json!({ "intensity": 500 })));
        let frame = encode(EncodingPolicy::Legacy, &request);

        assert_eq!(
            frame,
            json!({
                "version": 0,
                "type": "set_intensity",
                "client_id": "amaran-1",
                "node_id": "light-1",
                "args": { "intensity": 500 }
            })
        );
    }

    #[test]
    fn current_envelope_shape() {
        let request = Request::new("set_cct")
            .node("light-1")
            .args(args(json!({ "cct": 5600 })));
        let frame = encode(EncodingPolicy::Current, &request);

        assert_eq!(frame["version"], 2);
        assert_eq!(frame["type"], "request");
        assert_eq!(frame["client_id"], "amaran-1");
        assert_eq!(frame["request_id"], "req-1");
        assert_eq!(frame["node_id"], "light-1");
        assert_eq!(frame["action"], "set_cct");
        assert_eq!(frame["args"], json!({ "cct": 5600 }));
        assert!(frame["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn current_envelope_omits_absent_node_and_defaults_args() {
        let frame = encode(EncodingPolicy::Current, &Request::new("get_device_list"));
        assert!(frame.get("node_id").is_none());
        assert_eq!(frame["args"], json!({}));
    }

    #[test]
    fn current_tokens_are_fresh_for_identical_requests() {
        let seq = AtomicU64::new(0);
        let request = Request::new("toggle_sleep").node("N");

        let a = EncodingPolicy::Current.encode("c", &seq, &request).unwrap();
        let b = EncodingPolicy::Current.encode("c", &seq, &request).unwrap();

        let (WireMessage::Current(a), WireMessage::Current(b)) = (a, b) else {
            panic!("expected current envelopes");
        };
        assert_ne!(a.token, b.token);
        assert_eq!(a.request_id, "req-1");
        assert_eq!(b.request_id, "req-2");
    }

    #[test]
    fn legacy_encoding_does_not_advance_sequence() {
        let seq = AtomicU64::new(0);
        EncodingPolicy::Legacy
            .encode("c", &seq, &Request::new("toggle_sleep"))
            .unwrap();
        assert_eq!(seq.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classify_response() {
        let frame = InboundFrame::parse(
            r#"{"type":"response","client_id":"c","action":"set_sleep","code":0,"data":true,"node_id":"N","version":2}"#,
        )
        .unwrap();
        assert_eq!(frame.version(), Some(2));

        let Inbound::Response(resp) = frame.classify() else {
            panic!("expected response");
        };
        assert_eq!(resp.action.as_deref(), Some("set_sleep"));
        assert_eq!(resp.client_id.as_deref(), Some("c"));
        assert_eq!(resp.node_id.as_deref(), Some("N"));
        assert_eq!(resp.data, json!(true));
        assert!(resp.is_success());
    }

    #[test]
    fn response_without_code_is_not_success() {
        let frame = InboundFrame::parse(r#"{"type":"response","action":"get_cct"}"#).unwrap();
        let Inbound::Response(resp) = frame.classify() else {
            panic!("expected response");
        };
        assert!(!resp.is_success());
    }

    #[test]
    fn classify_event() {
        let frame = InboundFrame::parse(
            r#"{"type":"event","event":"intensity_changed","node_id":"N","data":500}"#,
        )
        .unwrap();
        assert_eq!(frame.version(), None);

        let Inbound::Event(event) = frame.classify() else {
            panic!("expected event");
        };
        assert_eq!(event.event, "intensity_changed");
        assert_eq!(event.data, json!(500));
    }

    #[test]
    fn classify_other_frames_as_unsolicited() {
        for text in [r#"{"hello":"world"}"#, r#"{"type":"event"}"#, "[1,2,3]", "42"] {
            let frame = InboundFrame::parse(text).unwrap();
            assert!(
                matches!(frame.classify(), Inbound::Unsolicited(_)),
                "{text} should be unsolicited"
            );
        }
    }

    #[test]
    fn malformed_text_is_a_deserialization_error() {
        let err = InboundFrame::parse("not json at all").unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "not json at all"));
    }

    #[test]
    fn string_version_is_accepted() {
        let frame = InboundFrame::parse(r#"{"type":"response","version":"0"}"#).unwrap();
        assert_eq!(frame.version(), Some(0));
    }

    #[test]
    fn whole_float_version_is_accepted() {
        let version = |raw: &str| InboundFrame::parse(raw).unwrap().version();
        assert_eq!(version(r#"{"type":"response","version":2.0}"#), Some(2));
        assert_eq!(version(r#"{"type":"response","version":"1.0"}"#), Some(1));
        assert_eq!(version(r#"{"type":"response","version":1.5}"#), None);
        assert_eq!(version(r#"{"type":"response","version":-1}"#), None);
    }
}
