//! Worker-side transport: one connection to the master, one background
//! receive-loop task, one tagged inbox.

use super::{read_frame, write_frame, CANCEL_TAG, HELLO_TAG};
use crate::error::{RecvTimeout, TransportError};
use crate::inbox::Inbox;
use crate::message::Message;
use crate::wire::{self, MsgType};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    rank: u32,
}

pub struct WorkerTransport {
    rank: u32,
    write_half: Mutex<OwnedWriteHalf>,
    inbox: Arc<Inbox>,
    cancel: Arc<AtomicBool>,
}

impl WorkerTransport {
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub async fn send(&self, dest: u32, tag: u32, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut write_half = self.write_half.lock().await;
        write_frame(&mut write_half, MsgType::Data, self.rank, dest, tag, &payload).await
    }

    pub async fn recv(
        &self,
        tag: Option<u32>,
        source: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Message, RecvTimeout> {
        self.inbox.recv(tag, source, timeout).await
    }
}

/// Connect to the master, send the HELLO handshake, and spawn the
/// background receive loop. Mirrors the original `connect_to_master`.
pub async fn connect_to_master(
    host: &str,
    port: u16,
    rank: u32,
    cancel: Arc<AtomicBool>,
) -> Result<WorkerTransport, TransportError> {
    let stream = TcpStream::connect((host, port)).await?;
    let (read_half, mut write_half) = stream.into_split();

    let hello = wire::serialize(&Hello { rank })?;
    write_frame(&mut write_half, MsgType::Control, rank, 0, HELLO_TAG, &hello).await?;

    let inbox = Arc::new(Inbox::new());
    tokio::spawn(recv_loop(read_half, inbox.clone(), cancel.clone()));

    Ok(WorkerTransport {
        rank,
        write_half: Mutex::new(write_half),
        inbox,
        cancel,
    })
}

/// Background receive loop: read frames forever, enqueue DATA, set the
/// cancel latch on CONTROL/CANCEL, silently stop on EOF.
async fn recv_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    inbox: Arc<Inbox>,
    cancel: Arc<AtomicBool>,
) {
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(frame)) => match frame.msg_type {
                MsgType::Data => {
                    inbox
                        .push(Message::new(frame.src, frame.dest, frame.tag, frame.payload))
                        .await;
                }
                MsgType::Control if frame.tag == CANCEL_TAG => {
                    cancel.store(true, Ordering::SeqCst);
                }
                MsgType::Control => {
                    debug!("ignoring reserved control tag {}", frame.tag);
                }
            },
            Ok(None) => {
                debug!("worker receive loop observed EOF from master");
                return;
            }
            Err(e) => {
                warn!("worker receive loop terminating: {}", e);
                return;
            }
        }
    }
}
