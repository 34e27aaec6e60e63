//! Wire envelopes for the channel and query transports.
//!
//! Channel frames travel as JSON text or `MsgPack` binary; both encodings
//! carry the same envelope types. Query-protocol replies follow that
//! protocol's native `{ data, errors }` shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorBody, InvocationError};
use crate::route::ResolverRoot;
use crate::types::Params;

// ---------------------------------------------------------------------------
// Channel transport
// ---------------------------------------------------------------------------

/// A call sent over a persistent channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Client-chosen correlation id echoed in the reply.
    pub id: u64,
    /// Event name, e.g. `/docs/get`.
    pub event: String,
    #[serde(default)]
    pub params: Params,
}

/// Reply to a [`ChannelRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ChannelReply {
    #[must_use]
    pub fn success(id: u64, data: Value) -> Self {
        Self {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: u64, error: &InvocationError) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(error.to_body()),
        }
    }
}

/// Encoding of a channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// UTF-8 JSON text frame.
    Json,
    /// `MsgPack` binary frame.
    MsgPack,
}

/// Decodes an inbound channel frame.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid request in `encoding`.
pub fn decode_request(bytes: &[u8], encoding: FrameEncoding) -> anyhow::Result<ChannelRequest> {
    Ok(match encoding {
        FrameEncoding::Json => serde_json::from_slice(bytes)?,
        FrameEncoding::MsgPack => rmp_serde::from_slice(bytes)?,
    })
}

/// Encodes an outbound channel frame.
///
/// # Errors
///
/// Returns an error if the reply cannot be serialized.
pub fn encode_reply(reply: &ChannelReply, encoding: FrameEncoding) -> anyhow::Result<Vec<u8>> {
    Ok(match encoding {
        FrameEncoding::Json => serde_json::to_vec(reply)?,
        FrameEncoding::MsgPack => rmp_serde::to_vec_named(reply)?,
    })
}

// ---------------------------------------------------------------------------
// Query transport
// ---------------------------------------------------------------------------

/// A single resolver call over the query protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub root: ResolverRoot,
    /// Resolver binding name.
    pub field: String,
    #[serde(default)]
    pub arguments: Params,
    /// Requested fields; becomes the call's field filter.
    #[serde(default)]
    pub selection: Option<Vec<String>>,
}

/// Error entry in a query-protocol response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryError {
    pub message: String,
    pub path: Vec<String>,
    pub extensions: Map<String, Value>,
}

/// Query-protocol response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<QueryError>,
}

impl QueryResponse {
    #[must_use]
    pub fn success(field: &str, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(field.to_string(), value);
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn failure(field: &str, error: &InvocationError) -> Self {
        let body = error.to_body();
        let mut extensions = Map::new();
        extensions.insert("code".to_string(), Value::String(body.name));
        extensions.insert("status".to_string(), Value::from(body.code));
        if let Some(data) = body.data {
            extensions.insert("data".to_string(), data);
        }
        Self {
            data: None,
            errors: vec![QueryError {
                message: body.message,
                path: vec![field.to_string()],
                extensions,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_decodes_from_json_and_msgpack() {
        let request = ChannelRequest {
            id: 7,
            event: "/docs/get".to_string(),
            params: serde_json::from_value(json!({"id": "a"})).unwrap(),
        };

        let json_bytes = serde_json::to_vec(&request).unwrap();
        let msgpack_bytes = rmp_serde::to_vec_named(&request).unwrap();

        assert_eq!(decode_request(&json_bytes, FrameEncoding::Json).unwrap(), request);
        assert_eq!(
            decode_request(&msgpack_bytes, FrameEncoding::MsgPack).unwrap(),
            request
        );
    }

    #[test]
    fn request_params_default_to_empty() {
        let req = decode_request(br#"{"id":1,"event":"/docs/list"}"#, FrameEncoding::Json).unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn failure_reply_carries_error_body() {
        let reply = ChannelReply::failure(3, &InvocationError::forbidden("not owner"));
        let bytes = encode_reply(&reply, FrameEncoding::Json).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["id"], 3);
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["name"], "Forbidden");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn query_failure_uses_native_error_shape() {
        let resp = QueryResponse::failure(
            "doc",
            &InvocationError::invalid_identifier("missing id"),
        );
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["data"], Value::Null);
        assert_eq!(value["errors"][0]["path"][0], "doc");
        assert_eq!(value["errors"][0]["extensions"]["code"], "InvalidIdentifier");
        assert_eq!(value["errors"][0]["extensions"]["status"], 400);
    }

    #[test]
    fn query_request_defaults_to_query_root() {
        let req: QueryRequest = serde_json::from_value(json!({"field": "doc"})).unwrap();
        assert_eq!(req.root, ResolverRoot::Query);
        assert!(req.selection.is_none());
    }
}
