use std::sync::{Arc, Mutex};

use tracing::info;

use super::{halt, lock_cursor, Cursor, FrameLoop, PreviewStatus, SharedCursor, Worker};
use crate::{
    broadcast::Broadcaster,
    model::{Channel, Play},
    timeline::FrameTimer,
    PiLitesError, Result,
};

/// Renders a play to observers only; never touches hardware.
pub struct PreviewSession {
    cursor: SharedCursor,
    worker: tokio::sync::Mutex<Option<Worker>>,
    broadcaster: Arc<Broadcaster>,
}

impl PreviewSession {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(None)),
            worker: tokio::sync::Mutex::new(None),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(lock_cursor(&self.cursor)?.is_some())
    }

    pub fn status(&self) -> Result<PreviewStatus> {
        let cursor = lock_cursor(&self.cursor)?;
        Ok(PreviewStatus {
            is_running: cursor.is_some(),
            play_id: cursor.as_ref().map(|cursor| cursor.play.id.clone()),
        })
    }

    pub fn cue_index(&self) -> Result<Option<usize>> {
        Ok(lock_cursor(&self.cursor)?.as_ref().map(|cursor| cursor.cue_index))
    }

    /// Starts rendering from the first cue. Fails with a conflict if a
    /// preview is already running.
    pub async fn start(&self, play: Arc<Play>, channels: Arc<[Channel]>, fps: u32) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if self.is_running()? {
            return Err(PiLitesError::conflict("a preview session is already running"));
        }
        // Reap a task that ended on its own before installing new state.
        halt(worker.take()).await;

        info!(play = %play.id, fps, "starting preview");
        *lock_cursor(&self.cursor)? = Some(Cursor::new(play, Arc::clone(&channels)));
        *worker = Some(Worker::spawn(FrameLoop {
            label: "preview",
            cursor: Arc::clone(&self.cursor),
            broadcaster: Arc::clone(&self.broadcaster),
            sink: None,
            channels,
            timer: FrameTimer::from_fps(fps),
        }));
        Ok(())
    }

    /// Moves to the next cue. A no-op on the last cue; a conflict when no
    /// preview is running.
    pub fn advance(&self) -> Result<()> {
        let mut guard = lock_cursor(&self.cursor)?;
        let cursor = guard
            .as_mut()
            .ok_or_else(|| PiLitesError::conflict("no preview session is running"))?;
        if cursor.advance() {
            info!(cue = cursor.cue_index, "preview advanced");
        }
        Ok(())
    }

    /// Cancels the frame task and waits for it. Stopping an idle session
    /// succeeds.
    pub async fn stop(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        halt(worker.take()).await;
        lock_cursor(&self.cursor)?.take();
        Ok(())
    }
}

impl std::fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}
