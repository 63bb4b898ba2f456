//! Transport abstraction: one connected socket per worker, one router on
//! the master. Grounded on `ipc::tcp_socket::TcpSocketTransport` (the
//! accept-loop-spawns-per-connection-handler pattern) but split into two
//! asymmetric roles because a worker and the master router have
//! different capabilities (the router can route to arbitrary
//! destinations; a worker can only ever talk to rank 0).

pub mod master;
pub mod worker;

use crate::error::TransportError;
use crate::wire::{self, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;

/// HELLO control tag used during the master accept handshake.
pub const HELLO_TAG: u32 = 100;
/// CANCEL control tag broadcast by `cancel_job`.
pub const CANCEL_TAG: u32 = 200;

pub use master::MasterRouter;
pub use worker::WorkerTransport;

/// One decoded frame read off a socket.
pub(crate) struct RawFrame {
    pub msg_type: wire::MsgType,
    pub src: u32,
    pub dest: u32,
    pub tag: u32,
    pub payload: Vec<u8>,
}

/// Read one frame from `reader`. Returns `Ok(None)` on a clean EOF at the
/// header boundary: a short header read is EOF, not an error at the
/// frame layer.
pub(crate) async fn read_frame(
    reader: &mut OwnedReadHalf,
) -> Result<Option<RawFrame>, TransportError> {
    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut header).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(TransportError::Io(e));
    }
    let (length, msg_type, src, dest, tag) =
        wire::unpack_header(&header).map_err(|_| TransportError::InvalidHandshake)?;
    let mut payload = vec![0u8; length as usize];
    if length > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok(Some(RawFrame {
        msg_type,
        src,
        dest,
        tag,
        payload,
    }))
}

/// Write one frame atomically: a single `write_all` call covering header
/// and payload, so concurrent writers on the same socket can never
/// interleave a partial frame.
pub(crate) async fn write_frame(
    writer: &mut OwnedWriteHalf,
    msg_type: wire::MsgType,
    src: u32,
    dest: u32,
    tag: u32,
    payload: &[u8],
) -> Result<(), TransportError> {
    let frame = wire::pack(msg_type, src, dest, tag, payload);
    writer.write_all(&frame).await?;
    Ok(())
}
