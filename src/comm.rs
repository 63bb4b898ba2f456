//! The communicator: rank-addressed point-to-point send/recv plus the
//! collectives built on top of them. `Transport` is an enum rather than a
//! trait object because rank 0's router and a worker's transport have
//! asymmetric capabilities (the router can address arbitrary ranks; a
//! worker can only ever talk to rank 0).

use crate::error::TransportError;
use crate::transport::{MasterRouter, WorkerTransport};
use crate::wire;
use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Conventional tag for user traffic. Any value disjoint from the
/// reserved collective/control tags is also valid; using one of the
/// reserved values below is undefined behavior, not defended against
/// at runtime.
pub const TAG_USER: u32 = 0;
pub const TAG_BCAST: u32 = 1;
pub const TAG_SCATTER: u32 = 2;
pub const TAG_GATHER: u32 = 3;
pub const TAG_BARRIER: u32 = 4;

pub enum Transport {
    Worker(WorkerTransport),
    Master(MasterRouter),
    /// Single-process fallback: no socket exists at all.
    Local,
}

pub struct Comm {
    rank: u32,
    size: u32,
    transport: Transport,
}

impl Comm {
    pub fn new(rank: u32, size: u32, transport: Transport) -> Self {
        Self {
            rank,
            size,
            transport,
        }
    }

    pub fn local() -> Self {
        Self {
            rank: 0,
            size: 1,
            transport: Transport::Local,
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// The cancel latch backing this communicator's transport, if any
    /// (absent for the size==1 `Local` fallback, which has nothing to
    /// cancel).
    pub fn cancel_flag(&self) -> Option<Arc<AtomicBool>> {
        match &self.transport {
            Transport::Worker(t) => Some(t.cancel_flag()),
            Transport::Master(r) => Some(r.cancel_flag()),
            Transport::Local => None,
        }
    }

    pub async fn send<T: Serialize>(&self, value: &T, dest: u32, tag: u32) -> Result<()> {
        let payload = wire::serialize(value)?;
        match &self.transport {
            Transport::Worker(t) => t.send(dest, tag, payload).await.map_err(Into::into),
            Transport::Master(r) => r.send(dest, tag, payload).await.map_err(Into::into),
            Transport::Local => bail!("point-to-point send is not available in single-process mode"),
        }
    }

    async fn send_bytes(&self, payload: Vec<u8>, dest: u32, tag: u32) -> Result<(), TransportError> {
        match &self.transport {
            Transport::Worker(t) => t.send(dest, tag, payload).await,
            Transport::Master(r) => r.send(dest, tag, payload).await,
            Transport::Local => Err(TransportError::SendToSelf),
        }
    }

    pub async fn recv<T: DeserializeOwned>(
        &self,
        source: Option<u32>,
        tag: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let msg = match &self.transport {
            Transport::Worker(t) => t.recv(tag, source, timeout).await?,
            Transport::Master(r) => r.recv(tag, source, timeout).await?,
            Transport::Local => bail!("point-to-point recv is not available in single-process mode"),
        };
        Ok(wire::deserialize(&msg.payload)?)
    }

    /// Broadcast `value` from `root` to every other rank. Returns `value`
    /// on every rank, identically.
    pub async fn bcast<T: Serialize + DeserializeOwned + Clone>(
        &self,
        value: T,
        root: u32,
    ) -> Result<T> {
        if self.size == 1 {
            return Ok(value);
        }
        if self.rank == root {
            let payload = wire::serialize(&value)?;
            for r in 0..self.size {
                if r != root {
                    self.send_bytes(payload.clone(), r, TAG_BCAST).await?;
                }
            }
            Ok(value)
        } else {
            self.recv(Some(root), Some(TAG_BCAST), None).await
        }
    }

    /// Scatter `values` (must have exactly `size` entries on root) across
    /// ranks; each rank returns its own slice.
    pub async fn scatter<T: Serialize + DeserializeOwned>(
        &self,
        values: Vec<T>,
        root: u32,
    ) -> Result<T> {
        if self.size == 1 {
            let mut values = values;
            if values.is_empty() {
                bail!("scatter values must match size");
            }
            return Ok(values.remove(0));
        }
        if self.rank == root {
            if values.len() as u32 != self.size {
                bail!("scatter values must match size");
            }
            let mut slots: Vec<Option<T>> = values.into_iter().map(Some).collect();
            for r in 0..self.size {
                if r == root {
                    continue;
                }
                let piece = slots[r as usize]
                    .take()
                    .expect("each non-root slot visited exactly once");
                self.send(&piece, r, TAG_SCATTER).await?;
            }
            Ok(slots[root as usize].take().expect("root slot untouched"))
        } else {
            self.recv(Some(root), Some(TAG_SCATTER), None).await
        }
    }

    /// Gather one value per rank at `root`, in rank order. `None` on
    /// non-root ranks.
    pub async fn gather<T: Serialize + DeserializeOwned>(
        &self,
        value: T,
        root: u32,
    ) -> Result<Option<Vec<T>>> {
        if self.size == 1 {
            return Ok(Some(vec![value]));
        }
        if self.rank == root {
            let mut results: Vec<Option<T>> = (0..self.size).map(|_| None).collect();
            results[root as usize] = Some(value);
            for r in 1..self.size {
                if r == root {
                    continue;
                }
                let piece: T = self.recv(Some(r), Some(TAG_GATHER), None).await?;
                results[r as usize] = Some(piece);
            }
            Ok(Some(
                results
                    .into_iter()
                    .map(|v| v.expect("every slot filled by rank order"))
                    .collect(),
            ))
        } else {
            self.send(&value, root, TAG_GATHER).await?;
            Ok(None)
        }
    }

    /// Broadcast a CANCEL control frame to every worker. Called by
    /// [`crate::runtime::cancel_job`] on rank 0 only; a no-op on workers
    /// and in single-process mode, since only the master can originate a
    /// cancellation.
    pub async fn broadcast_cancel(&self) -> Result<()> {
        if let Transport::Master(router) = &self.transport {
            for r in 1..self.size {
                router
                    .send_control(r, crate::transport::CANCEL_TAG, Vec::new())
                    .await?;
            }
        }
        Ok(())
    }

    /// Gather-then-broadcast: every rank returns once every rank has
    /// reached the barrier.
    pub async fn barrier(&self) -> Result<()> {
        if self.size == 1 {
            return Ok(());
        }
        if self.rank == 0 {
            for r in 1..self.size {
                let _: bool = self.recv(Some(r), Some(TAG_BARRIER), None).await?;
            }
            for r in 1..self.size {
                self.send(&true, r, TAG_BARRIER).await?;
            }
        } else {
            self.send(&true, 0, TAG_BARRIER).await?;
            let _: bool = self.recv(Some(0), Some(TAG_BARRIER), None).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_process_bcast_is_identity() {
        let comm = Comm::local();
        let out: i32 = comm.bcast(7, 0).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn single_process_gather_is_singleton() {
        let comm = Comm::local();
        let out = comm.gather(3, 0).await.unwrap();
        assert_eq!(out, Some(vec![3]));
    }

    #[tokio::test]
    async fn single_process_scatter_returns_only_value() {
        let comm = Comm::local();
        let out: i32 = comm.scatter(vec![9], 0).await.unwrap();
        assert_eq!(out, 9);
    }

    #[tokio::test]
    async fn single_process_barrier_is_noop() {
        let comm = Comm::local();
        comm.barrier().await.unwrap();
    }

    #[tokio::test]
    async fn single_process_point_to_point_fails() {
        let comm = Comm::local();
        assert!(comm.send(&1i32, 0, TAG_USER).await.is_err());
        assert!(comm.recv::<i32>(None, None, None).await.is_err());
    }

    #[tokio::test]
    async fn scatter_length_mismatch_fails_on_root() {
        let comm = Comm::local();
        let result: Result<i32> = comm.scatter(Vec::new(), 0).await;
        assert!(result.is_err());
    }
}
