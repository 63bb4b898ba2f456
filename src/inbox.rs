//! Tag/source-filtered FIFO inbox.
//!
//! A single `VecDeque` behind a `tokio::sync::Mutex`, the same locking
//! idiom used for the connection table in `TcpSocketTransport`.
//! Filtering re-enqueues non-matching messages at the back rather than
//! keeping a per-tag index.

use crate::error::RecvTimeout;
use crate::message::Message;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Poll granularity for `recv`, kept well under 100ms so cancellation
/// and timeouts stay responsive.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Inbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, msg: Message) {
        self.queue.lock().await.push_back(msg);
    }

    /// Dequeue the next message matching `tag`/`source` (either may be
    /// `None` to mean "any"). Non-matching messages found along the way
    /// are re-enqueued at the back, preserving arrival order for the
    /// next search.
    pub async fn recv(
        &self,
        tag: Option<u32>,
        source: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Message, RecvTimeout> {
        let start = Instant::now();
        loop {
            {
                let mut queue = self.queue.lock().await;
                let len = queue.len();
                for _ in 0..len {
                    let msg = queue.pop_front().unwrap();
                    let tag_ok = tag.map_or(true, |t| msg.tag == t);
                    let src_ok = source.map_or(true, |s| msg.src == s);
                    if tag_ok && src_ok {
                        return Ok(msg);
                    }
                    queue.push_back(msg);
                }
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(RecvTimeout);
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_per_source_dest_preserves_send_order() {
        let inbox = Inbox::new();
        for i in 0..5u32 {
            inbox.push(Message::new(1, 0, 0, vec![i as u8])).await;
        }
        for i in 0..5u32 {
            let msg = inbox.recv(None, None, None).await.unwrap();
            assert_eq!(msg.payload, vec![i as u8]);
        }
    }

    #[tokio::test]
    async fn tag_filter_requeues_non_matching_and_never_returns_them() {
        let inbox = Inbox::new();
        inbox.push(Message::new(1, 0, 10, vec![1])).await;
        inbox.push(Message::new(1, 0, 20, vec![2])).await;
        inbox.push(Message::new(1, 0, 10, vec![3])).await;
        inbox.push(Message::new(1, 0, 20, vec![4])).await;

        let first = inbox.recv(Some(10), None, None).await.unwrap();
        let second = inbox.recv(Some(10), None, None).await.unwrap();
        assert_eq!(first.payload, vec![1]);
        assert_eq!(second.payload, vec![3]);

        let leftover_a = inbox.recv(Some(20), None, None).await.unwrap();
        let leftover_b = inbox.recv(Some(20), None, None).await.unwrap();
        assert_eq!(leftover_a.payload, vec![2]);
        assert_eq!(leftover_b.payload, vec![4]);
    }

    #[tokio::test]
    async fn recv_times_out_when_nothing_matches() {
        let inbox = Inbox::new();
        inbox.push(Message::new(1, 0, 99, vec![])).await;
        let result = inbox
            .recv(Some(1), None, Some(Duration::from_millis(120)))
            .await;
        assert!(result.is_err());
    }
}
