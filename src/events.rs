//! # Events — Job Channel Protocol
//!
//! Messages a running pipeline emits to whoever started it (the WebSocket
//! handler or the CLI), and the [`Reporter`] that sends them.
//!
//! ## Message Types
//!
//! | `type` | Fields | Terminal |
//! |--------|--------|----------|
//! | `status` | `message`, `progress?`, `task_id?`, `domain?` | no |
//! | `candidate` | `domain`, `progress`, `message` | no |
//! | `result` | `domain`, `progress` | no |
//! | `error` | `message` | yes |
//! | `done` | `message`, `progress` (always 100) | yes |
//!
//! ## Progress Bands
//!
//! Setup reports 0–30, collection 30–70, verification 70–99, completion 100.
//! The reporter remembers the highest progress sent so far; messages never
//! move the bar backwards.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::Candidate;

pub const COLLECTION_START: u8 = 30;
pub const VERIFICATION_START: u8 = 70;
pub const VERIFICATION_CAP: u8 = 99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobMessage {
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<Candidate>,
    },
    Candidate {
        domain: Candidate,
        progress: u8,
        message: String,
    },
    Result {
        domain: Candidate,
        progress: u8,
    },
    Error {
        message: String,
    },
    Done {
        message: String,
        progress: u8,
    },
}

impl JobMessage {
    pub fn status(message: impl Into<String>, progress: Option<u8>) -> Self {
        JobMessage::Status {
            message: message.into(),
            progress,
            task_id: None,
            domain: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobMessage::Error {
            message: message.into(),
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        JobMessage::Done {
            message: message.into(),
            progress: 100,
        }
    }

    /// `error` and `done` end the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobMessage::Error { .. } | JobMessage::Done { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            JobMessage::Status { progress, .. } => *progress,
            JobMessage::Candidate { progress, .. }
            | JobMessage::Result { progress, .. }
            | JobMessage::Done { progress, .. } => Some(*progress),
            JobMessage::Error { .. } => None,
        }
    }
}

/// Collection band: `30 + n·40/target`, capped at 70.
pub fn collection_progress(collected: usize, over_fetch_target: usize) -> u8 {
    if over_fetch_target == 0 {
        return VERIFICATION_START;
    }
    let span = (VERIFICATION_START - COLLECTION_START) as usize;
    let p = COLLECTION_START as usize + collected * span / over_fetch_target;
    p.min(VERIFICATION_START as usize) as u8
}

/// Verification band: `70 + current·29/total`, capped at 99.
pub fn verification_progress(current: usize, total: usize) -> u8 {
    if total == 0 {
        return VERIFICATION_CAP;
    }
    let span = (VERIFICATION_CAP - VERIFICATION_START) as usize;
    let p = VERIFICATION_START as usize + current * span / total;
    p.min(VERIFICATION_CAP as usize) as u8
}

/// Sending half of a job channel.
#[derive(Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<JobMessage>,
    progress: Arc<AtomicU8>,
}

pub fn channel() -> (Reporter, mpsc::UnboundedReceiver<JobMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Reporter {
            tx,
            progress: Arc::new(AtomicU8::new(0)),
        },
        rx,
    )
}

impl Reporter {
    /// Deliver one message. `false` once the receiving side is gone.
    pub fn send(&self, mut msg: JobMessage) -> bool {
        if let Some(p) = msg.progress() {
            let prev = self.progress.fetch_max(p, Ordering::Relaxed);
            if p < prev {
                set_progress(&mut msg, prev);
            }
        }
        self.tx.send(msg).is_ok()
    }

    pub fn status(&self, message: impl Into<String>, progress: Option<u8>) -> bool {
        self.send(JobMessage::status(message, progress))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(JobMessage::error(message))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Highest progress reported so far.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }
}

fn set_progress(msg: &mut JobMessage, value: u8) {
    match msg {
        JobMessage::Status { progress, .. } => *progress = Some(value),
        JobMessage::Candidate { progress, .. }
        | JobMessage::Result { progress, .. }
        | JobMessage::Done { progress, .. } => *progress = value,
        JobMessage::Error { .. } => {}
    }
}
