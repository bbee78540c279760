//! Polls the exercise table and tracks which exercise drives the worker.

use super::record::{ActiveExercise, ExerciseId, ExerciseStatus};
use super::store::{RecordConnection, RecordStore};

/// Polls between forced reconnects.
pub const DEFAULT_RECONNECT_EVERY: u32 = 5;

/// Status written when an exercise is completed.
///
/// This is Comparing, the same status the completion check requires, while
/// selection only picks Calibrating/ReadyOrDone records. Completion is
/// therefore unreachable for records selected through `poll`; kept as the
/// record table's existing contract (see DESIGN.md, open question 1).
pub const COMPLETION_STATUS: ExerciseStatus = ExerciseStatus::Comparing;

/// What the worker asks of the exercise state once per frame.
pub trait ExerciseSource {
    /// Runs one polling cycle and returns the exercise in effect.
    fn poll(&mut self) -> Option<ActiveExercise>;

    /// The worker saw a passing score for exercise `id`.
    fn complete(&mut self, id: ExerciseId);
}

/// Owns the record-store connection and the polling cadence.
///
/// The connection is opened on first use and re-opened every
/// `reconnect_every` polls, or after any store failure. On failure the
/// last-known active exercise stays in effect.
pub struct ExerciseCoordinator<S: RecordStore> {
    store: S,
    conn: Option<S::Connection>,
    polls_since_connect: u32,
    reconnect_every: u32,
    active: Option<ActiveExercise>,
    ambiguity_warnings: u64,
    connects: u64,
}

impl<S: RecordStore> ExerciseCoordinator<S> {
    pub fn new(store: S, reconnect_every: u32) -> Self {
        Self {
            store,
            conn: None,
            polls_since_connect: 0,
            reconnect_every: reconnect_every.max(1),
            active: None,
            ambiguity_warnings: 0,
            connects: 0,
        }
    }

    fn connection(&mut self) -> Option<&mut S::Connection> {
        if self.conn.is_none() || self.polls_since_connect >= self.reconnect_every {
            self.conn = None;
            match self.store.connect() {
                Ok(conn) => {
                    tracing::debug!("record store connected");
                    self.conn = Some(conn);
                    self.polls_since_connect = 0;
                    self.connects += 1;
                }
                Err(e) => {
                    tracing::warn!("record store connect failed: {}", e);
                    return None;
                }
            }
        }
        self.conn.as_mut()
    }

    /// One polling cycle.
    pub fn refresh(&mut self) -> Option<&ActiveExercise> {
        let result = match self.connection() {
            Some(conn) => Some(conn.eligible_records()),
            None => None,
        };
        self.polls_since_connect += 1;

        match result {
            Some(Ok(records)) => {
                if records.len() > 1 {
                    self.ambiguity_warnings += 1;
                    let ids: Vec<_> = records.iter().map(|r| r.id).collect();
                    tracing::warn!(
                        "{} eligible exercises {:?}, using id {}",
                        records.len(),
                        ids,
                        records[0].id
                    );
                }
                let next = records.first().map(ActiveExercise::from);
                if next != self.active {
                    match &next {
                        Some(a) => tracing::info!("active exercise: {} '{}' [{}]", a.id, a.name, a.mode),
                        None => tracing::info!("no active exercise"),
                    }
                }
                self.active = next;
            }
            Some(Err(e)) => {
                tracing::warn!("exercise query failed, keeping last state: {}", e);
                self.conn = None;
            }
            None => {}
        }
        self.active.as_ref()
    }

    /// Writes [`COMPLETION_STATUS`] for `id`.
    pub fn mark_complete(&mut self, id: ExerciseId) -> bool {
        let Some(conn) = self.connection() else {
            return false;
        };
        match conn.update_status(id, COMPLETION_STATUS) {
            Ok(()) => {
                tracing::info!("exercise {} marked {}", id, COMPLETION_STATUS);
                true
            }
            Err(e) => {
                tracing::warn!("failed to mark exercise {} complete: {}", id, e);
                self.conn = None;
                false
            }
        }
    }

    /// Polls that saw more than one eligible record.
    pub fn ambiguity_warnings(&self) -> u64 {
        self.ambiguity_warnings
    }

    pub fn connects(&self) -> u64 {
        self.connects
    }
}

impl<S: RecordStore> ExerciseSource for ExerciseCoordinator<S> {
    fn poll(&mut self) -> Option<ActiveExercise> {
        self.refresh().cloned()
    }

    fn complete(&mut self, id: ExerciseId) {
        self.mark_complete(id);
    }
}
