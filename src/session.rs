//! The single active client session and its manual pose alignment.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::alignment::{AlignmentTransform, MIN_SCALE};
use crate::buffer::{Frame, FrameBuffer};

/// Translation per move step, as a fraction of the image extent.
pub const MOVE_STEP: f32 = 0.01;
/// Scale change per step.
pub const SCALE_STEP: f32 = 0.05;

/// Transport-assigned identity of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingId(pub u64);

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Manual alignment commands sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    ScaleUp,
    ScaleDown,
    Reset,
}

impl AdjustAction {
    pub fn apply(self, t: AlignmentTransform) -> AlignmentTransform {
        match self {
            Self::MoveUp => AlignmentTransform { offset_y: t.offset_y - MOVE_STEP, ..t },
            Self::MoveDown => AlignmentTransform { offset_y: t.offset_y + MOVE_STEP, ..t },
            Self::MoveLeft => AlignmentTransform { offset_x: t.offset_x - MOVE_STEP, ..t },
            Self::MoveRight => AlignmentTransform { offset_x: t.offset_x + MOVE_STEP, ..t },
            Self::ScaleUp => AlignmentTransform::new(t.offset_x, t.offset_y, t.scale + SCALE_STEP),
            Self::ScaleDown => {
                AlignmentTransform::new(t.offset_x, t.offset_y, (t.scale - SCALE_STEP).max(MIN_SCALE))
            }
            Self::Reset => AlignmentTransform::identity(),
        }
    }
}

impl FromStr for AdjustAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move_up" => Ok(Self::MoveUp),
            "move_down" => Ok(Self::MoveDown),
            "move_left" => Ok(Self::MoveLeft),
            "move_right" => Ok(Self::MoveRight),
            "scale_up" => Ok(Self::ScaleUp),
            "scale_down" => Ok(Self::ScaleDown),
            "reset" => Ok(Self::Reset),
            other => Err(format!("unknown adjust action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub routing_id: RoutingId,
    pub transform: AlignmentTransform,
}

/// What the worker produces for each processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// Annotated frame, JPEG encoded
    pub image: Vec<u8>,
    /// Similarity to the reference; `None` when either pose was missing
    pub score: Option<f32>,
}

/// Delivery of results to a connected client. Must not block.
pub trait Outbox: Send + Sync {
    fn emit(&self, routing_id: RoutingId, result: FrameResult);
}

/// Tracks the one attached client.
///
/// Attaching replaces any previous session. Detaching only takes effect for
/// the id currently attached, and clears pending frames from the buffer.
pub struct SessionRegistry {
    current: Mutex<Option<Session>>,
    buffer: Arc<FrameBuffer>,
    outbox: Arc<dyn Outbox>,
}

impl SessionRegistry {
    pub fn new(buffer: Arc<FrameBuffer>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            current: Mutex::new(None),
            buffer,
            outbox,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attach(&self, routing_id: RoutingId) -> Session {
        let session = Session {
            routing_id,
            transform: AlignmentTransform::identity(),
        };
        let previous = self.lock().replace(session);
        match previous {
            Some(prev) if prev.routing_id != routing_id => {
                let drained = self.buffer.drain();
                tracing::info!(
                    "{} replaces {} as active session, {} pending frame(s) discarded",
                    routing_id,
                    prev.routing_id,
                    drained
                );
            }
            _ => tracing::info!("{} attached", routing_id),
        }
        session
    }

    pub fn is_attached(&self, routing_id: RoutingId) -> bool {
        matches!(*self.lock(), Some(s) if s.routing_id == routing_id)
    }

    /// Queues `frame` for the worker if `routing_id` is the attached session.
    /// Frames from any other connection are discarded and false is returned.
    pub fn submit(&self, routing_id: RoutingId, frame: Frame) -> bool {
        let current = self.lock();
        if !matches!(*current, Some(s) if s.routing_id == routing_id) {
            return false;
        }
        // held across the push so a takeover cannot interleave
        if self.buffer.push(frame) {
            tracing::trace!("frame buffer full, oldest frame evicted");
        }
        true
    }

    /// Returns true if `routing_id` was the attached session.
    pub fn detach(&self, routing_id: RoutingId) -> bool {
        let detached = {
            let mut current = self.lock();
            match *current {
                Some(s) if s.routing_id == routing_id => {
                    *current = None;
                    true
                }
                _ => false,
            }
        };
        if detached {
            let drained = self.buffer.drain();
            tracing::info!("{} detached, {} pending frame(s) discarded", routing_id, drained);
        } else {
            tracing::debug!("ignoring detach for stale {}", routing_id);
        }
        detached
    }

    /// Applies `action` to the attached session's transform. `None` when no
    /// session is attached.
    pub fn adjust(&self, action: AdjustAction) -> Option<AlignmentTransform> {
        let mut current = self.lock();
        let session = current.as_mut()?;
        session.transform = action.apply(session.transform);
        tracing::debug!("{:?} -> {:?}", action, session.transform);
        Some(session.transform)
    }

    pub fn current(&self) -> Option<Session> {
        *self.lock()
    }

    /// The attached session's transform, if any.
    pub fn transform(&self) -> Option<AlignmentTransform> {
        self.lock().map(|s| s.transform)
    }

    /// Sends `result` to the attached session. Dropped (returns false) when
    /// nobody is attached.
    pub fn route(&self, result: FrameResult) -> bool {
        let Some(session) = self.current() else {
            return false;
        };
        self.outbox.emit(session.routing_id, result);
        true
    }
}
