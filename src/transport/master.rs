//! Master-side router: binds a listening socket, accepts and handshakes
//! exactly `expected_workers` connections, then runs one route-loop task
//! per worker doing store-and-forward. Grounded on
//! `TcpSocketTransport::start_multi_server`'s accept loop and its
//! `connections: Arc<Mutex<HashMap<ConnectionId, TcpStream>>>` table,
//! adapted to perform the HELLO handshake synchronously before spawning
//! the per-connection loop (`handle_connection` there is fire-and-forget;
//! this router cannot be, since callers need to know every rank is
//! present before `run` proceeds).

use super::{read_frame, write_frame, HELLO_TAG};
use crate::error::TransportError;
use crate::inbox::Inbox;
use crate::message::Message;
use crate::wire::{self, MsgType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    rank: u32,
}

pub struct MasterRouter {
    actual_port: u16,
    listener: Option<TcpListener>,
    connections: Arc<Mutex<HashMap<u32, OwnedWriteHalf>>>,
    inbox: Arc<Inbox>,
    expected_workers: u32,
    cancel: Arc<AtomicBool>,
}

impl MasterRouter {
    /// Bind on `host:port` (port 0 ⇒ kernel-chosen ephemeral port).
    pub async fn bind(
        host: &str,
        port: u16,
        expected_workers: u32,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((host, port)).await?;
        let actual_port = listener.local_addr()?.port();
        Ok(Self {
            actual_port,
            listener: Some(listener),
            connections: Arc::new(Mutex::new(HashMap::new())),
            inbox: Arc::new(Inbox::new()),
            expected_workers,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Accept exactly `expected_workers` connections, handshaking each
    /// before spawning its route loop. Fails if `timeout` elapses first.
    pub async fn accept_all(&self, timeout: Duration) -> Result<(), TransportError> {
        let listener = self
            .listener
            .as_ref()
            .expect("accept_all called after listener consumed");
        let deadline = Instant::now() + timeout;

        loop {
            {
                let connections = self.connections.lock().await;
                if connections.len() as u32 >= self.expected_workers {
                    return Ok(());
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::AcceptTimeout);
            }

            let accept_result = tokio::time::timeout(remaining, listener.accept()).await;
            let (stream, peer) = match accept_result {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(TransportError::Io(e)),
                Err(_) => return Err(TransportError::AcceptTimeout),
            };

            match self.handshake_and_spawn(stream, peer).await {
                Ok(()) => {}
                Err(e) => {
                    warn!("rejecting worker connection from {}: {}", peer, e);
                    return Err(e);
                }
            }
        }
    }

    async fn handshake_and_spawn(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), TransportError> {
        let (mut read_half, write_half) = stream.into_split();
        let frame = read_frame(&mut read_half)
            .await?
            .ok_or(TransportError::InvalidHandshake)?;
        if frame.msg_type != MsgType::Control || frame.tag != HELLO_TAG {
            return Err(TransportError::InvalidHandshake);
        }
        let hello: Hello =
            wire::deserialize(&frame.payload).map_err(|_| TransportError::InvalidHandshake)?;
        let rank = hello.rank;

        let mut connections = self.connections.lock().await;
        if connections.contains_key(&rank) {
            return Err(TransportError::DuplicateRank(rank));
        }
        connections.insert(rank, write_half);
        drop(connections);

        info!("rank {} connected from {}", rank, peer);
        tokio::spawn(route_loop(
            rank,
            read_half,
            self.connections.clone(),
            self.inbox.clone(),
        ));
        Ok(())
    }

    /// Forward `payload` to `dest` as a DATA frame. `dest == 0` is illegal.
    pub async fn send(&self, dest: u32, tag: u32, payload: Vec<u8>) -> Result<(), TransportError> {
        if dest == 0 {
            return Err(TransportError::SendToSelf);
        }
        let mut connections = self.connections.lock().await;
        let writer = connections
            .get_mut(&dest)
            .ok_or(TransportError::UnknownDestination(dest))?;
        write_frame(writer, MsgType::Data, 0, dest, tag, &payload).await
    }

    /// Send a CONTROL frame (used for HELLO acks — unused today — and
    /// for the CANCEL broadcast).
    pub async fn send_control(
        &self,
        dest: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mut connections = self.connections.lock().await;
        let writer = connections
            .get_mut(&dest)
            .ok_or(TransportError::UnknownDestination(dest))?;
        write_frame(writer, MsgType::Control, 0, dest, tag, &payload).await
    }

    /// Receive the next message addressed to rank 0, from the master's
    /// own inbox (fed by every route loop).
    pub async fn recv(
        &self,
        tag: Option<u32>,
        source: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Message, crate::error::RecvTimeout> {
        self.inbox.recv(tag, source, timeout).await
    }

    pub async fn connected_ranks(&self) -> Vec<u32> {
        self.connections.lock().await.keys().copied().collect()
    }
}

/// One route loop per accepted worker connection. Reads frames forever;
/// `dest == 0` frames are enqueued locally, others are forwarded verbatim
/// to the destination's write half under that connection's single-writer
/// mutex, so concurrent forwards can never interleave a partial frame.
async fn route_loop(
    rank: u32,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    connections: Arc<Mutex<HashMap<u32, OwnedWriteHalf>>>,
    inbox: Arc<Inbox>,
) {
    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("route loop for rank {} observed EOF", rank);
                return;
            }
            Err(e) => {
                warn!("route loop for rank {} terminating: {}", rank, e);
                return;
            }
        };

        match frame.msg_type {
            MsgType::Data if frame.dest == 0 => {
                inbox
                    .push(Message::new(frame.src, frame.dest, frame.tag, frame.payload))
                    .await;
            }
            MsgType::Data => {
                let mut connections = connections.lock().await;
                match connections.get_mut(&frame.dest) {
                    Some(writer) => {
                        if let Err(e) = write_frame(
                            writer,
                            MsgType::Data,
                            frame.src,
                            frame.dest,
                            frame.tag,
                            &frame.payload,
                        )
                        .await
                        {
                            error!(
                                "route loop for rank {} failed forwarding to {}: {}",
                                rank, frame.dest, e
                            );
                            return;
                        }
                    }
                    None => {
                        error!(
                            "route loop for rank {} got frame for unknown destination {}",
                            rank, frame.dest
                        );
                        return;
                    }
                }
            }
            MsgType::Control => {
                // No worker-originated CONTROL frames are currently defined; ignore.
            }
        }
    }
}
