//! Fixed 17-byte frame header and the payload codec.
//!
//! Grounded on `ipc::Message::to_bytes`/`from_bytes` (bincode-over-serde)
//! and `ipc::tcp_socket::read_message`'s length-prefixed framing, extended
//! to the network-byte-order, five-field header this runtime's wire
//! protocol requires.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Header size in bytes: u32 length, u8 type, u32 src, u32 dest, u32 tag.
pub const HEADER_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Data = 1,
    Control = 2,
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsgType::Data),
            2 => Ok(MsgType::Control),
            other => Err(ProtocolError::InvalidType(other)),
        }
    }
}

/// Pack a header + payload into one contiguous frame.
pub fn pack(msg_type: MsgType, src: u32, dest: u32, tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.push(msg_type as u8);
    frame.extend_from_slice(&src.to_be_bytes());
    frame.extend_from_slice(&dest.to_be_bytes());
    frame.extend_from_slice(&tag.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Decode a 17-byte header. Callers are responsible for reading exactly
/// `HEADER_LEN` bytes first; a short read is EOF, not a protocol error.
pub fn unpack_header(header: &[u8; HEADER_LEN]) -> Result<(u32, MsgType, u32, u32, u32), ProtocolError> {
    let length = u32::from_be_bytes(header[0..4].try_into().unwrap());
    let msg_type = MsgType::try_from(header[4])?;
    let src = u32::from_be_bytes(header[5..9].try_into().unwrap());
    let dest = u32::from_be_bytes(header[9..13].try_into().unwrap());
    let tag = u32::from_be_bytes(header[13..17].try_into().unwrap());
    Ok((length, msg_type, src, dest, tag))
}

/// Serialize a value with the payload codec (bincode), as every rank does.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

/// Deserialize a value with the payload codec.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

/// Encode a value for the `MPI_RUN_ARGS` environment variable: `bincode`
/// then base64, matching the original `transport.encode_args`.
pub fn encode_args<T: Serialize>(value: &T) -> anyhow::Result<String> {
    use base64::Engine;
    let bytes = serialize(value)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Decode a value previously produced by [`encode_args`].
pub fn decode_args<T: DeserializeOwned>(blob: &str) -> anyhow::Result<T> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(blob)?;
    Ok(deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_preserves_header_and_payload() {
        let payload = b"hello world".to_vec();
        let frame = pack(MsgType::Data, 3, 7, 42, &payload);

        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let (length, msg_type, src, dest, tag) = unpack_header(&header).unwrap();

        assert_eq!(length as usize, payload.len());
        assert_eq!(msg_type, MsgType::Data);
        assert_eq!(src, 3);
        assert_eq!(dest, 7);
        assert_eq!(tag, 42);
        assert_eq!(&frame[HEADER_LEN..], &payload[..]);
    }

    #[test]
    fn empty_payload_is_legal() {
        let frame = pack(MsgType::Control, 0, 1, 100, &[]);
        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let (length, msg_type, ..) = unpack_header(&header).unwrap();
        assert_eq!(length, 0);
        assert_eq!(msg_type, MsgType::Control);
        assert_eq!(frame.len(), HEADER_LEN);
    }

    #[test]
    fn invalid_type_byte_fails() {
        let mut frame = pack(MsgType::Data, 0, 0, 0, &[]);
        frame[4] = 9;
        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        assert!(matches!(
            unpack_header(&header),
            Err(ProtocolError::InvalidType(9))
        ));
    }

    #[test]
    fn codec_round_trip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Record {
            a: i64,
            b: Vec<f64>,
            c: String,
        }
        let value = Record {
            a: -7,
            b: vec![1.0, 2.5, 3.25],
            c: "mpi".to_string(),
        };
        let bytes = serialize(&value).unwrap();
        let decoded: Record = deserialize(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn args_round_trip_through_base64() {
        let blob = encode_args(&(1i32, "two".to_string())).unwrap();
        let (a, b): (i32, String) = decode_args(&blob).unwrap();
        assert_eq!((a, b.as_str()), (1, "two"));
    }
}
