//! Wire envelope and framing for the RMI substrate.
//!
//! Framing follows the teacher library's approach exactly: a 4-byte
//! little-endian length prefix around each frame, built with
//! [`tokio_util::codec::LengthDelimitedCodec`]. Unlike the teacher,
//! whose payload is a fixed hand-rolled `FCall` encoding (one 9P
//! message type), the payload here is a self-describing
//! [`bincode`]-encoded [`Request`]/[`Reply`] envelope, because a generic
//! RMI layer must carry arbitrary argument lists for arbitrary
//! interfaces rather than one closed protocol enum.

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// One RMI request: method name, the parameter type tags it was
/// invoked with (used to find the right entry in the interface
/// descriptor) and the bincode-encoded argument tuple.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub params: Vec<String>,
    pub args: Vec<u8>,
}

/// One RMI reply. If `ok`, `payload` is the bincode-encoded return
/// value (or an encoded unit for void methods); otherwise `payload` is
/// the bincode-encoded [`RemoteError`] the server method raised.
#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn ok<T: Serialize>(value: &T) -> Result<Reply, RemoteError> {
        Ok(Reply {
            ok: true,
            payload: bincode::serialize(value)?,
        })
    }

    pub fn err(e: &RemoteError) -> Reply {
        Reply {
            ok: false,
            // An error that itself fails to serialize becomes a
            // transport error; bincode never fails on this enum.
            payload: bincode::serialize(e).unwrap_or_default(),
        }
    }

    pub fn into_result<T: for<'de> Deserialize<'de>>(self) -> Result<T, RemoteError> {
        if self.ok {
            bincode::deserialize(&self.payload).map_err(RemoteError::from)
        } else {
            let e: RemoteError = bincode::deserialize(&self.payload)
                .unwrap_or_else(|_| RemoteError::Transport("malformed error payload".into()));
            Err(e)
        }
    }
}

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_codec()
}

pub fn framed_read<R: AsyncRead + Unpin>(reader: R) -> FramedRead<R, LengthDelimitedCodec> {
    FramedRead::new(reader, codec())
}

pub fn framed_write<W: AsyncWrite + Unpin>(writer: W) -> FramedWrite<W, LengthDelimitedCodec> {
    FramedWrite::new(writer, codec())
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, RemoteError> {
    bincode::serialize(req).map_err(RemoteError::from)
}

pub fn decode_request(buf: &[u8]) -> Result<Request, RemoteError> {
    bincode::deserialize(buf).map_err(RemoteError::from)
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, RemoteError> {
    bincode::serialize(reply).map_err(RemoteError::from)
}

pub fn decode_reply(buf: &[u8]) -> Result<Reply, RemoteError> {
    bincode::deserialize(buf).map_err(RemoteError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_round_trips_ok_value() {
        let reply = Reply::ok(&42u64).unwrap();
        let bytes = encode_reply(&reply).unwrap();
        let decoded = decode_reply(&bytes).unwrap();
        let value: u64 = decoded.into_result().unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn reply_round_trips_error() {
        let reply = Reply::err(&RemoteError::FileNotFound);
        let bytes = encode_reply(&reply).unwrap();
        let decoded = decode_reply(&bytes).unwrap();
        let result: Result<(), RemoteError> = decoded.into_result();
        assert_eq!(result.unwrap_err(), RemoteError::FileNotFound);
    }

    #[test]
    fn request_round_trips() {
        let req = Request {
            method: "isDirectory".to_owned(),
            params: vec!["Path".to_owned()],
            args: bincode::serialize(&("/a/b".to_owned(),)).unwrap(),
        };
        let bytes = encode_request(&req).unwrap();
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded.method, "isDirectory");
        assert_eq!(decoded.params, vec!["Path".to_owned()]);
    }
}
