// Audio render port
// The scheduler only sees this trait; how bytes become sound is up to the implementor.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::RenderError;

/// Terminal result of one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Rendered to the end
    Completed,
    /// Stopped early through `RenderHandle::halt`
    Halted,
    /// The renderer gave up mid-playback
    Failed(String),
}

#[derive(Debug, Clone)]
enum RenderStatus {
    Rendering,
    Ended(RenderOutcome),
}

/// Caller side of an active render.
///
/// Cloneable so both the playing task and `stop()` can wait on the same render.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    halt_tx: Arc<watch::Sender<bool>>,
    status_rx: watch::Receiver<RenderStatus>,
}

/// Renderer side of an active render. Reports exactly one terminal outcome.
#[derive(Debug)]
pub struct RenderCompletion {
    halt_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<RenderStatus>,
}

/// Create a linked handle/completion pair for a new render
pub fn render_channel() -> (RenderHandle, RenderCompletion) {
    let (halt_tx, halt_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(RenderStatus::Rendering);
    (
        RenderHandle {
            halt_tx: Arc::new(halt_tx),
            status_rx,
        },
        RenderCompletion { halt_rx, status_tx },
    )
}

impl RenderHandle {
    /// Ask the renderer to stop now. Idempotent.
    pub fn halt(&self) {
        self.halt_tx.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        *self.halt_tx.borrow()
    }

    /// True once a terminal outcome has been reported
    pub fn is_finished(&self) -> bool {
        matches!(*self.status_rx.borrow(), RenderStatus::Ended(_))
    }

    /// Wait for the single terminal outcome.
    ///
    /// A renderer that drops its completion without reporting counts as a failure.
    pub async fn ended(&self) -> RenderOutcome {
        let mut status_rx = self.status_rx.clone();
        let status = status_rx
            .wait_for(|status| matches!(status, RenderStatus::Ended(_)))
            .await
            .map(|status| status.clone());
        match status {
            Ok(RenderStatus::Ended(outcome)) => outcome,
            _ => RenderOutcome::Failed("renderer dropped the render without an outcome".into()),
        }
    }
}

impl RenderCompletion {
    pub fn is_halted(&self) -> bool {
        *self.halt_rx.borrow()
    }

    /// Resolves once the handle side calls `halt`
    pub async fn halted(&mut self) {
        // An error means every handle is gone; nobody is left to wait on the outcome.
        let _ = self.halt_rx.wait_for(|halted| *halted).await;
    }

    /// Report the terminal outcome, consuming the completion
    pub fn finish(self, outcome: RenderOutcome) {
        self.status_tx.send_replace(RenderStatus::Ended(outcome));
    }
}

/// Decodes encoded audio and renders it to an output.
///
/// Implementors own their output device exclusively: it is opened lazily on the
/// first render, released by `suspend`, and torn down by `close`.
#[async_trait]
pub trait AudioRenderer: Send + Sync {
    /// Decode `bytes` and start rendering them
    async fn decode_and_play(&self, bytes: Vec<u8>) -> Result<RenderHandle, RenderError>;

    /// Release the output between sounds
    async fn suspend(&self) -> Result<(), RenderError>;

    /// Tear the output down; a later render reopens it
    async fn close(&self) -> Result<(), RenderError>;
}
