//! Message codes and protobuf wire messages for the key-value protocol.
//!
//! Every on-wire message is a one-byte code followed by a protobuf payload.
//! The message structs carry their wire field numbers directly in prost
//! attributes, so no schema compiler runs at build time (the same approach
//! works for talking to stock servers, which use the identical numbering).

use prost::Message;

/// One-byte message codes prefixed to every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCode {
    /// Server-reported failure, in place of any expected response.
    ErrorResp = 0,
    /// Fetch request.
    GetReq = 9,
    /// Fetch response.
    GetResp = 10,
    /// Store request.
    PutReq = 11,
    /// Store response.
    PutResp = 12,
    /// Remove request.
    DelReq = 13,
    /// Remove response.
    DelResp = 14,
}

impl MessageCode {
    /// Maps a wire byte back to a known code.
    pub fn from_u8(value: u8) -> Option<MessageCode> {
        match value {
            0 => Some(MessageCode::ErrorResp),
            9 => Some(MessageCode::GetReq),
            10 => Some(MessageCode::GetResp),
            11 => Some(MessageCode::PutReq),
            12 => Some(MessageCode::PutResp),
            13 => Some(MessageCode::DelReq),
            14 => Some(MessageCode::DelResp),
            _ => None,
        }
    }
}

/// A key/value metadata pair (user metadata and secondary index entries).
#[derive(Clone, PartialEq, Message)]
pub struct Pair {
    /// Pair key.
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    /// Pair value.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

/// One replica value together with its metadata.
#[derive(Clone, PartialEq, Message)]
pub struct Content {
    /// The stored value bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
    /// MIME content type.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub content_type: Option<Vec<u8>>,
    /// Character set.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub charset: Option<Vec<u8>>,
    /// Content encoding.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_encoding: Option<Vec<u8>>,
    /// Server-assigned version tag.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub vtag: Option<Vec<u8>>,
    /// Server-maintained last-modified time, seconds.
    #[prost(uint32, optional, tag = "7")]
    pub last_mod: Option<u32>,
    /// Server-maintained last-modified time, microsecond part.
    #[prost(uint32, optional, tag = "8")]
    pub last_mod_usecs: Option<u32>,
    /// User metadata pairs.
    #[prost(message, repeated, tag = "9")]
    pub usermeta: Vec<Pair>,
    /// Secondary index entries.
    #[prost(message, repeated, tag = "10")]
    pub indexes: Vec<Pair>,
    /// Tombstone marker.
    #[prost(bool, optional, tag = "11")]
    pub deleted: Option<bool>,
}

/// Fetch request.
#[derive(Clone, PartialEq, Message)]
pub struct GetRequest {
    /// Bucket name.
    #[prost(bytes = "vec", tag = "1")]
    pub bucket: Vec<u8>,
    /// Key within the bucket.
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    /// Ask for the causal clock of tombstoned objects too.
    #[prost(bool, optional, tag = "9")]
    pub deletedvclock: Option<bool>,
    /// Server-side timeout in milliseconds.
    #[prost(uint32, optional, tag = "10")]
    pub timeout: Option<u32>,
}

/// Fetch response.
#[derive(Clone, PartialEq, Message)]
pub struct GetResponse {
    /// The siblings; more than one means the object is in conflict.
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<Content>,
    /// Opaque causal clock; empty means the object never existed.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    /// Set when a conditional fetch matched.
    #[prost(bool, optional, tag = "3")]
    pub unchanged: Option<bool>,
}

/// Store request.
#[derive(Clone, PartialEq, Message)]
pub struct PutRequest {
    /// Bucket name.
    #[prost(bytes = "vec", tag = "1")]
    pub bucket: Vec<u8>,
    /// Key within the bucket.
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    /// Causal clock from the preceding fetch, if any.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub vclock: Option<Vec<u8>>,
    /// The content to store.
    #[prost(message, optional, tag = "4")]
    pub content: Option<Content>,
    /// Ask for only the new causal clock back, not the body.
    #[prost(bool, optional, tag = "11")]
    pub return_head: Option<bool>,
    /// Server-side timeout in milliseconds.
    #[prost(uint32, optional, tag = "12")]
    pub timeout: Option<u32>,
}

/// Store response.
#[derive(Clone, PartialEq, Message)]
pub struct PutResponse {
    /// Returned contents (at most one after a clean head-only store).
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<Content>,
    /// New causal clock, when `return_head` was requested.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    /// Server-generated key, when none was supplied.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
}

/// Remove request.
#[derive(Clone, PartialEq, Message)]
pub struct DelRequest {
    /// Bucket name.
    #[prost(bytes = "vec", tag = "1")]
    pub bucket: Vec<u8>,
    /// Key within the bucket.
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    /// Causal clock from the preceding fetch, if any.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub vclock: Option<Vec<u8>>,
    /// Server-side timeout in milliseconds.
    #[prost(uint32, optional, tag = "10")]
    pub timeout: Option<u32>,
}

/// Remove response; carries nothing.
#[derive(Clone, PartialEq, Message)]
pub struct DelResponse {}

/// Server-reported error.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    /// Human-readable error text.
    #[prost(bytes = "vec", tag = "1")]
    pub errmsg: Vec<u8>,
    /// Numeric error code; informational only.
    #[prost(uint32, tag = "2")]
    pub errcode: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_codes_survive_the_wire_byte() {
        for code in [
            MessageCode::ErrorResp,
            MessageCode::GetReq,
            MessageCode::GetResp,
            MessageCode::PutReq,
            MessageCode::PutResp,
            MessageCode::DelReq,
            MessageCode::DelResp,
        ] {
            assert_eq!(MessageCode::from_u8(code as u8), Some(code));
        }
        assert_eq!(MessageCode::from_u8(99), None);
    }

    #[test]
    fn get_request_round_trips() {
        let request = GetRequest {
            bucket: b"users".to_vec(),
            key: b"alice".to_vec(),
            deletedvclock: Some(true),
            timeout: Some(3000),
        };
        let decoded = GetRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn put_request_round_trips_with_content() {
        let request = PutRequest {
            bucket: b"users".to_vec(),
            key: b"alice".to_vec(),
            vclock: Some(b"opaque-clock".to_vec()),
            content: Some(Content {
                value: b"hello".to_vec(),
                content_type: Some(b"text/plain".to_vec()),
                deleted: Some(true),
                ..Default::default()
            }),
            return_head: Some(true),
            timeout: Some(3000),
        };
        let decoded = PutRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn get_response_with_siblings_round_trips() {
        let response = GetResponse {
            content: vec![
                Content { value: b"a".to_vec(), ..Default::default() },
                Content { value: b"bb".to_vec(), ..Default::default() },
            ],
            vclock: Some(b"clock".to_vec()),
            unchanged: None,
        };
        let decoded = GetResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.content.len(), 2);
        assert_eq!(decoded, response);
    }

    #[test]
    fn empty_messages_encode_to_nothing() {
        assert!(DelResponse::default().encode_to_vec().is_empty());
        assert!(GetResponse::default().encode_to_vec().is_empty());
    }
}
