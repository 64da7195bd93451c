use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::{halt, lock_cursor, Cursor, FrameLoop, LiveStatus, SharedCursor, Worker};
use crate::{
    broadcast::{Broadcaster, Message, Subscription},
    hardware::PixelSink,
    model::{Channel, Play},
    timeline::FrameTimer,
    PiLitesError, Result,
};

/// Drives the physical strips through a [`PixelSink`] and mirrors every
/// frame to observers. Every state transition is announced as a status
/// message.
pub struct LiveSession {
    cursor: SharedCursor,
    worker: tokio::sync::Mutex<Option<Worker>>,
    broadcaster: Arc<Broadcaster>,
    sink: Arc<dyn PixelSink>,
}

impl LiveSession {
    pub fn new(broadcaster: Arc<Broadcaster>, sink: Arc<dyn PixelSink>) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(None)),
            worker: tokio::sync::Mutex::new(None),
            broadcaster,
            sink,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(lock_cursor(&self.cursor)?.is_some())
    }

    pub fn status(&self) -> Result<LiveStatus> {
        Ok(lock_cursor(&self.cursor)?
            .as_ref()
            .map_or_else(LiveStatus::idle, Cursor::live_status))
    }

    /// Connects a new observer and immediately sends it the current status.
    pub fn subscribe(&self) -> Result<Subscription> {
        let subscription = self.broadcaster.subscribe()?;
        self.broadcaster
            .send_to(subscription.id, &Message::Status(self.status()?))?;
        Ok(subscription)
    }

    pub async fn start(&self, play: Arc<Play>, channels: Arc<[Channel]>, fps: u32) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if self.is_running()? {
            return Err(PiLitesError::conflict("a live session is already running"));
        }
        halt(worker.take()).await;

        info!(play = %play.id, fps, "starting live playback");
        let status = {
            let mut cursor = lock_cursor(&self.cursor)?;
            let started = Cursor::new(play, Arc::clone(&channels));
            let status = started.live_status();
            *cursor = Some(started);
            status
        };
        // Announced before the task exists so a failure report cannot be
        // overtaken by a stale "running" status.
        self.announce(status);
        *worker = Some(Worker::spawn(FrameLoop {
            label: "live",
            cursor: Arc::clone(&self.cursor),
            broadcaster: Arc::clone(&self.broadcaster),
            sink: Some(Arc::clone(&self.sink)),
            channels,
            timer: FrameTimer::from_fps(fps),
        }));
        Ok(())
    }

    /// Moves to the next cue and lifts any blackout. On the last cue nothing
    /// changes and no status is sent.
    pub fn advance(&self) -> Result<()> {
        let status = {
            let mut guard = lock_cursor(&self.cursor)?;
            let cursor = guard
                .as_mut()
                .ok_or_else(|| PiLitesError::conflict("no live session is running"))?;
            if !cursor.advance() {
                return Ok(());
            }
            cursor.blackout = false;
            info!(cue = cursor.cue_index, "live advanced");
            cursor.live_status()
        };
        self.announce(status);
        Ok(())
    }

    /// Forces every following frame to black until the next advance.
    pub fn blackout(&self) -> Result<()> {
        let status = {
            let mut guard = lock_cursor(&self.cursor)?;
            let cursor = guard
                .as_mut()
                .ok_or_else(|| PiLitesError::conflict("no live session is running"))?;
            cursor.blackout = true;
            info!(cue = cursor.cue_index, "live blackout");
            cursor.live_status()
        };
        self.announce(status);
        Ok(())
    }

    /// Stops playback and darkens the strips. Stopping an idle session
    /// succeeds without touching hardware.
    pub async fn stop(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        let channels = lock_cursor(&self.cursor)?
            .as_ref()
            .map(|cursor| Arc::clone(&cursor.channels));
        halt(worker.take()).await;
        lock_cursor(&self.cursor)?.take();

        let Some(channels) = channels else {
            return Ok(());
        };
        info!("live playback stopped");
        if let Err(err) = self.sink.all_off(&channels) {
            warn!(%err, "could not darken hardware on stop");
        }
        self.announce(LiveStatus::idle());
        Ok(())
    }

    /// Stops playback and releases the sink.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        self.sink.close()
    }

    fn announce(&self, status: LiveStatus) {
        if let Err(err) = self.broadcaster.broadcast(&Message::Status(status)) {
            warn!(%err, "failed to announce live status");
        }
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}
