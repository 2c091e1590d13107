//! Process-wide session store.
//!
//! Each session id owns a cell with two locks: an async turn guard held for a whole inbound
//! message, and a short synchronous lock around the session data itself. The data lock is
//! never held across an `.await`, and different ids never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;

use santai_core::domain::candidate::Candidate;
use santai_core::domain::preferences::{MergeReport, PreferenceRecord, PreferenceUpdate};
use santai_core::domain::session::{Session, SessionId};
use santai_core::protocol::Acknowledgment;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

struct SessionCell {
    turn: Arc<tokio::sync::Mutex<()>>,
    session: Mutex<Session>,
}

impl SessionCell {
    fn new(id: SessionId) -> Self {
        Self { turn: Arc::new(tokio::sync::Mutex::new(())), session: Mutex::new(Session::new(id)) }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        match self.session.lock() {
            Ok(session) => session,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Held by whoever is processing a message for one session.
pub struct TurnGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub cached_candidates: usize,
}

#[derive(Default)]
pub struct SessionStore {
    cells: RwLock<HashMap<SessionId, Arc<SessionCell>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for `id`, creating an empty session on first touch.
    fn cell(&self, id: &SessionId) -> Arc<SessionCell> {
        let existing = match self.cells.read() {
            Ok(cells) => cells.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        };
        if let Some(cell) = existing {
            return cell;
        }

        let mut cells = match self.cells.write() {
            Ok(cells) => cells,
            Err(poisoned) => poisoned.into_inner(),
        };
        cells.entry(id.clone()).or_insert_with(|| Arc::new(SessionCell::new(id.clone()))).clone()
    }

    /// Applies the non-empty parts of `update` and returns the merged record along with what
    /// changed. Merges for one id are serialized by the session lock.
    pub fn merge(
        &self,
        id: &SessionId,
        update: &PreferenceUpdate,
    ) -> (PreferenceRecord, MergeReport) {
        self.update(id, |session| {
            let report = session.record.merge(update);
            (session.record.clone(), report)
        })
    }

    pub fn get(&self, id: &SessionId) -> PreferenceRecord {
        self.cell(id).lock().record.clone()
    }

    pub fn snapshot(&self, id: &SessionId) -> Session {
        self.cell(id).lock().clone()
    }

    /// Like `snapshot`, but never creates a session.
    pub fn peek(&self, id: &SessionId) -> Option<Session> {
        self.existing(id).map(|cell| cell.lock().clone())
    }

    fn existing(&self, id: &SessionId) -> Option<Arc<SessionCell>> {
        match self.cells.read() {
            Ok(cells) => cells.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    /// Drops sessions not updated within `idle`. Sessions with a message in flight, or with
    /// one waiting for its turn, are kept. Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let Ok(idle) = chrono::Duration::from_std(idle) else {
            return 0;
        };
        let cutoff = Utc::now() - idle;

        let mut cells = match self.cells.write() {
            Ok(cells) => cells,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = cells.len();
        cells.retain(|_, cell| {
            let in_use = Arc::strong_count(cell) > 1 || Arc::strong_count(&cell.turn) > 1;
            in_use || cell.lock().updated_at > cutoff
        });
        before - cells.len()
    }

    /// Starts the session over. The cell, and with it any turn guard already held, survives.
    pub fn reset(&self, id: &SessionId) {
        let cell = self.cell(id);
        let mut session = cell.lock();
        *session = Session::new(id.clone());
    }

    pub fn cache_candidates(&self, id: &SessionId, candidates: Vec<Candidate>) {
        self.update(id, |session| session.present_candidates(candidates));
    }

    pub fn get_candidates(&self, id: &SessionId) -> Vec<Candidate> {
        self.cell(id).lock().candidates.clone()
    }

    /// Runs `f` against the session under its lock. `f` must not block.
    pub fn update<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> R {
        let cell = self.cell(id);
        let mut session = cell.lock();
        let result = f(&mut session);
        session.touch();
        result
    }

    /// Waits until no other message for `id` is being processed.
    pub async fn begin_turn(&self, id: &SessionId) -> TurnGuard {
        let turn = Arc::clone(&self.cell(id).turn);
        TurnGuard { _guard: turn.lock_owned().await }
    }

    /// Attaches an acknowledgment if the session exists. Returns whether it was attached.
    pub fn attach_acknowledgment(&self, id: &SessionId, acknowledgment: Acknowledgment) -> bool {
        let Some(cell) = self.existing(id) else {
            return false;
        };
        let mut session = cell.lock();
        session.acknowledgment = Some(acknowledgment);
        session.touch();
        true
    }

    /// Finds the most recently updated session that notified `recipient` about `gift_name`.
    pub fn find_notified(&self, recipient: &str, gift_name: &str) -> Option<SessionId> {
        let cells: Vec<Arc<SessionCell>> = match self.cells.read() {
            Ok(cells) => cells.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        cells
            .iter()
            .filter_map(|cell| {
                let session = cell.lock();
                let notification = session.notification.as_ref()?;
                let found = notification.recipient.eq_ignore_ascii_case(recipient)
                    && notification.gift_name == gift_name;
                let entry = found.then(|| (session.updated_at, session.id.clone()));
                entry
            })
            .max_by_key(|(updated_at, _)| *updated_at)
            .map(|(_, id)| id)
    }

    pub fn stats(&self) -> StoreStats {
        let cells: Vec<Arc<SessionCell>> = match self.cells.read() {
            Ok(cells) => cells.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        StoreStats {
            active_sessions: cells.len(),
            cached_candidates: cells.iter().map(|cell| cell.lock().candidates.len()).sum(),
        }
    }
}
