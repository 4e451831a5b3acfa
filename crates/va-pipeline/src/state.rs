use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use va_core::bus::OperationKind;
use va_core::session::SessionId;

/// A snapshot of whether each operation kind is currently busy for a
/// session, mirroring the `GET /processing-status/{session_id}` response
/// shape (SPEC_FULL §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub summary_busy: bool,
    pub mind_map_busy: bool,
    pub summary_started_at: Option<DateTime<Utc>>,
    pub mind_map_started_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    pub fn any_processing(&self) -> bool {
        self.summary_busy || self.mind_map_busy
    }
}

struct Slot {
    started_at: DateTime<Utc>,
}

/// Central concurrency gate: at most one in-flight run per
/// `(session, operation_kind)` (SPEC_FULL §4.3). Guarded by a plain
/// `std::sync::Mutex` rather than `tokio::sync::Mutex` — every operation
/// here is O(1) and never spans an `.await`, and using a sync mutex means
/// the compiler rejects any attempt to hold it across a suspension point,
/// enforcing the locking discipline in SPEC_FULL §5 rather than relying
/// on code review to catch a violation.
#[derive(Default)]
pub struct ProcessingStateManager {
    sessions: Mutex<HashMap<SessionId, HashMap<OperationKind, Slot>>>,
}

impl ProcessingStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims the `(session, kind)` slot if free. Returns
    /// `true` on success, `false` if already busy.
    pub fn try_start(&self, session_id: &SessionId, kind: OperationKind) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let slots = sessions.entry(session_id.clone()).or_default();
        if slots.contains_key(&kind) {
            false
        } else {
            slots.insert(
                kind,
                Slot {
                    started_at: Utc::now(),
                },
            );
            true
        }
    }

    /// `try_start` wrapped in an RAII guard: the slot is released when
    /// the guard drops, on every exit path — success, error, or panic
    /// unwind — satisfying invariant 3 in SPEC_FULL §4.3 without the
    /// caller needing a `finally`-shaped block. Returns `None` when the
    /// slot is already busy.
    pub fn try_start_guarded(
        self: &Arc<Self>,
        session_id: SessionId,
        kind: OperationKind,
    ) -> Option<SlotGuard> {
        if self.try_start(&session_id, kind) {
            Some(SlotGuard {
                manager: self.clone(),
                session_id,
                kind,
            })
        } else {
            None
        }
    }

    /// Releases the `(session, kind)` slot. If no slots remain busy for
    /// the session, the session's entry is dropped entirely — a
    /// `ProcessingSlot` lives only while at least one kind is busy
    /// (SPEC_FULL §3).
    pub fn stop(&self, session_id: &SessionId, kind: OperationKind) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(slots) = sessions.get_mut(session_id) {
            slots.remove(&kind);
            if slots.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    pub fn is_busy(&self, session_id: &SessionId, kind: OperationKind) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|slots| slots.contains_key(&kind))
    }

    pub fn is_busy_any(&self, session_id: &SessionId) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|slots| !slots.is_empty())
    }

    pub fn status(&self, session_id: &SessionId) -> SessionStatus {
        let sessions = self.sessions.lock().unwrap();
        let slots = sessions.get(session_id);
        SessionStatus {
            summary_busy: slots.is_some_and(|s| s.contains_key(&OperationKind::Summary)),
            mind_map_busy: slots.is_some_and(|s| s.contains_key(&OperationKind::MindMap)),
            summary_started_at: slots
                .and_then(|s| s.get(&OperationKind::Summary))
                .map(|slot| slot.started_at),
            mind_map_started_at: slots
                .and_then(|s| s.get(&OperationKind::MindMap))
                .map(|slot| slot.started_at),
        }
    }

    /// For the "clean release" property (SPEC_FULL §8.8): no session
    /// should ever linger in the map with zero busy slots.
    #[cfg(test)]
    pub fn tracked_session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

/// Releases its `(session, kind)` slot when dropped.
pub struct SlotGuard {
    manager: Arc<ProcessingStateManager>,
    session_id: SessionId,
    kind: OperationKind,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.manager.stop(&self.session_id, self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn mutual_exclusion_within_a_kind() {
        let manager = ProcessingStateManager::new();
        let session = "s1".to_string();
        assert!(manager.try_start(&session, OperationKind::Summary));
        assert!(!manager.try_start(&session, OperationKind::Summary));
        manager.stop(&session, OperationKind::Summary);
        assert!(manager.try_start(&session, OperationKind::Summary));
    }

    #[test]
    fn kinds_are_independent() {
        let manager = ProcessingStateManager::new();
        let session = "s1".to_string();
        assert!(manager.try_start(&session, OperationKind::Summary));
        assert!(manager.try_start(&session, OperationKind::MindMap));
        assert!(manager.is_busy(&session, OperationKind::Summary));
        assert!(manager.is_busy(&session, OperationKind::MindMap));
    }

    #[test]
    fn stop_clears_empty_session_entirely() {
        let manager = ProcessingStateManager::new();
        let session = "s1".to_string();
        manager.try_start(&session, OperationKind::Summary);
        manager.try_start(&session, OperationKind::MindMap);
        manager.stop(&session, OperationKind::Summary);
        assert_eq!(manager.tracked_session_count(), 1);
        manager.stop(&session, OperationKind::MindMap);
        assert_eq!(manager.tracked_session_count(), 0);
    }

    #[test]
    fn guard_releases_slot_on_drop() {
        let manager = Arc::new(ProcessingStateManager::new());
        let session = "s1".to_string();
        {
            let _guard = manager
                .try_start_guarded(session.clone(), OperationKind::Summary)
                .unwrap();
            assert!(manager.is_busy(&session, OperationKind::Summary));
        }
        assert!(!manager.is_busy(&session, OperationKind::Summary));
        assert_eq!(manager.tracked_session_count(), 0);
    }

    #[test]
    fn second_guarded_start_is_rejected_while_first_holds() {
        let manager = Arc::new(ProcessingStateManager::new());
        let session = "s1".to_string();
        let guard = manager
            .try_start_guarded(session.clone(), OperationKind::Summary)
            .unwrap();
        assert!(manager
            .try_start_guarded(session.clone(), OperationKind::Summary)
            .is_none());
        drop(guard);
        assert!(manager
            .try_start_guarded(session, OperationKind::Summary)
            .is_some());
    }

    #[test]
    fn adversarial_concurrent_try_start_exactly_one_winner_per_round() {
        let manager = Arc::new(ProcessingStateManager::new());
        let session = "s1".to_string();

        for _round in 0..200 {
            let winners = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let mut handles = Vec::new();
            for _ in 0..64 {
                let manager = manager.clone();
                let session = session.clone();
                let winners = winners.clone();
                handles.push(thread::spawn(move || {
                    if manager.try_start(&session, OperationKind::Summary) {
                        winners.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(std::sync::atomic::Ordering::SeqCst), 1);
            manager.stop(&session, OperationKind::Summary);
        }
        assert_eq!(manager.tracked_session_count(), 0);
    }

    #[test]
    fn status_reports_started_at_only_while_busy() {
        let manager = ProcessingStateManager::new();
        let session = "s1".to_string();
        let status = manager.status(&session);
        assert!(!status.any_processing());
        assert!(status.summary_started_at.is_none());

        manager.try_start(&session, OperationKind::MindMap);
        let status = manager.status(&session);
        assert!(status.mind_map_busy);
        assert!(status.mind_map_started_at.is_some());
        assert!(!status.summary_busy);
    }
}
