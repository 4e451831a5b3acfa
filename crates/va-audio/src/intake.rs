use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::error::Result;
use crate::frame::{validate_wav, FrameUnit};

/// Per-session FIFO with a soft high-water mark: pushing past the mark
/// drops the oldest queued frame rather than blocking the caller
/// (SPEC_FULL §4.1).
struct SessionQueue {
    frames: VecDeque<FrameUnit>,
    high_water_mark: usize,
}

impl SessionQueue {
    fn new(high_water_mark: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            high_water_mark,
        }
    }

    /// Returns `true` if the oldest frame was dropped to stay within the
    /// high-water mark (SPEC_FULL §4.1's `Overflow` event).
    fn push(&mut self, frame: FrameUnit) -> bool {
        self.frames.push_back(frame);
        if self.frames.len() > self.high_water_mark {
            self.frames.pop_front();
            true
        } else {
            false
        }
    }

    fn pop_front(&mut self) -> Option<FrameUnit> {
        self.frames.pop_front()
    }
}

struct SessionEntry {
    queue: SessionQueue,
    notify: Arc<Notify>,
}

/// Registry of per-session audio queues. A `mpsc` channel was considered
/// (see `SPEC_FULL.md` §4.1.1) and rejected because it has no peek/pop-
/// oldest primitive needed for the high-water-mark drop policy; a plain
/// `VecDeque` guarded by the same single-mutex-per-registry discipline
/// the teacher uses for its pipeline state is simpler and sufficient.
pub struct AudioIntake {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    high_water_mark: usize,
}

impl AudioIntake {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            high_water_mark,
        }
    }

    /// Validates `frame` against the WAV/PCM contract (SPEC_FULL §4.1)
    /// before enqueueing it; rejects without ever touching the queue on
    /// failure so a malformed frame can't consume a high-water-mark slot.
    /// Never awaits a full queue — always returns immediately. Returns
    /// `Ok(true)` if the oldest queued frame was dropped to honor the
    /// high-water mark, so the caller can surface SPEC_FULL §4.1/§7's
    /// `Overflow` client event — `push` itself has no bus handle to
    /// publish one directly.
    pub async fn push(&self, frame: FrameUnit) -> Result<bool> {
        validate_wav(&frame.bytes)?;

        let mut sessions = self.sessions.lock().await;
        let session_id = frame.session_id.clone();
        let entry = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry {
                queue: SessionQueue::new(self.high_water_mark),
                notify: Arc::new(Notify::new()),
            });
        let overflowed = entry.queue.push(frame);
        if overflowed {
            warn!(session_id, "intake queue overflow, dropped oldest frame");
        }
        entry.notify.notify_one();
        Ok(overflowed)
    }

    /// Pops the oldest queued frame for a session, if any.
    pub async fn pop(&self, session_id: &str) -> Option<FrameUnit> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(session_id).and_then(|e| e.queue.pop_front())
    }

    /// Wakes when a new frame arrives for `session_id`. Registers the
    /// session if it doesn't exist yet, so a worker can subscribe before
    /// any audio has arrived.
    pub async fn notifier(&self, session_id: &str) -> Arc<Notify> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                queue: SessionQueue::new(self.high_water_mark),
                notify: Arc::new(Notify::new()),
            })
            .notify
            .clone()
    }

    /// Drops a session's queue entirely, e.g. once its worker retires.
    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_pcm;

    fn frame(session_id: &str, n: u8) -> FrameUnit {
        FrameUnit {
            session_id: session_id.to_string(),
            bytes: encode_pcm(&[n as i16]).unwrap(),
            received_at_ms: n as u64,
        }
    }

    #[tokio::test]
    async fn push_then_pop_preserves_order() {
        let intake = AudioIntake::new(10);
        intake.push(frame("s1", 1)).await.unwrap();
        intake.push(frame("s1", 2)).await.unwrap();
        assert!(intake.pop("s1").await.is_some());
        assert!(intake.pop("s1").await.is_some());
        assert!(intake.pop("s1").await.is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_is_reported() {
        let intake = AudioIntake::new(2);
        assert_eq!(intake.push(frame("s1", 1)).await.unwrap(), false);
        assert_eq!(intake.push(frame("s1", 2)).await.unwrap(), false);
        assert_eq!(intake.push(frame("s1", 3)).await.unwrap(), true);
        let first = intake.pop("s1").await.unwrap();
        assert_eq!(first.received_at_ms, 2);
        let second = intake.pop("s1").await.unwrap();
        assert_eq!(second.received_at_ms, 3);
        assert!(intake.pop("s1").await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let intake = AudioIntake::new(10);
        intake.push(frame("s1", 1)).await.unwrap();
        intake.push(frame("s2", 9)).await.unwrap();
        assert_eq!(intake.pop("s1").await.unwrap().received_at_ms, 1);
        assert_eq!(intake.pop("s2").await.unwrap().received_at_ms, 9);
    }

    #[tokio::test]
    async fn notifier_wakes_on_push() {
        let intake = Arc::new(AudioIntake::new(10));
        let notify = intake.notifier("s1").await;
        let intake2 = intake.clone();
        let handle = tokio::spawn(async move {
            intake2.push(frame("s1", 1)).await.unwrap();
        });
        notify.notified().await;
        handle.await.unwrap();
        assert!(intake.pop("s1").await.is_some());
    }

    #[tokio::test]
    async fn remove_session_clears_queue() {
        let intake = AudioIntake::new(10);
        intake.push(frame("s1", 1)).await.unwrap();
        intake.remove_session("s1").await;
        assert!(intake.pop("s1").await.is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected_before_queueing() {
        let intake = AudioIntake::new(10);
        let bad = FrameUnit {
            session_id: "s1".to_string(),
            bytes: vec![0, 1, 2, 3],
            received_at_ms: 0,
        };
        assert!(intake.push(bad).await.is_err());
        assert!(intake.pop("s1").await.is_none());
    }
}
