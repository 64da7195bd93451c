//! Preview and live playback sessions.
//!
//! A session owns at most one frame task. The task composites the current
//! cue every tick, delivers the frame, then sleeps for the rest of the frame
//! interval. Control calls (`advance`, `blackout`) only mutate the shared
//! cursor; the task picks the change up on its next tick.

mod live;
mod preview;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    broadcast::{Broadcaster, Message},
    compositor::{build_frame, Frame},
    hardware::PixelSink,
    model::{Channel, Play},
    timeline::{CueClock, FrameTimer},
    PiLitesError, Result,
};

pub use live::LiveSession;
pub use preview::PreviewSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStatus {
    pub is_running: bool,
    pub play_id: Option<String>,
}

/// Snapshot of a live session, sent on every state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub play_id: Option<String>,
    pub cue_id: Option<String>,
    pub cue_name: Option<String>,
    pub cue_index: Option<usize>,
    pub is_running: bool,
    pub is_blackout: bool,
}

impl LiveStatus {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Position of a running session within its play.
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    play: Arc<Play>,
    channels: Arc<[Channel]>,
    cue_index: usize,
    clock: CueClock,
    blackout: bool,
}

impl Cursor {
    fn new(play: Arc<Play>, channels: Arc<[Channel]>) -> Self {
        Self {
            play,
            channels,
            cue_index: 0,
            clock: CueClock::start(),
            blackout: false,
        }
    }

    /// Moves to the next cue. Returns false, changing nothing, when already
    /// on the last cue.
    fn advance(&mut self) -> bool {
        if self.cue_index + 1 >= self.play.cues.len() {
            return false;
        }
        self.cue_index += 1;
        self.clock.reset();
        true
    }

    fn live_status(&self) -> LiveStatus {
        let cue = self.play.cues.get(self.cue_index);
        LiveStatus {
            play_id: Some(self.play.id.clone()),
            cue_id: cue.map(|cue| cue.id.clone()),
            cue_name: cue.map(|cue| cue.name.clone()),
            cue_index: Some(self.cue_index),
            is_running: true,
            is_blackout: self.blackout,
        }
    }
}

pub(crate) type SharedCursor = Arc<Mutex<Option<Cursor>>>;

pub(crate) fn lock_cursor(cursor: &SharedCursor) -> Result<MutexGuard<'_, Option<Cursor>>> {
    cursor
        .lock()
        .map_err(|_| PiLitesError::msg("session state has been poisoned"))
}

/// Handle to a spawned frame task.
pub(crate) struct Worker {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(frame_loop: FrameLoop) -> Self {
        let (cancel, cancelled) = watch::channel(false);
        let handle = tokio::spawn(frame_loop.run(cancelled));
        Self { cancel, handle }
    }

    /// Requests cancellation and waits for the task to finish.
    async fn halt(self) {
        let _ = self.cancel.send(true);
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                error!(%err, "frame task panicked");
            }
        }
    }
}

pub(crate) async fn halt(worker: Option<Worker>) {
    if let Some(worker) = worker {
        worker.halt().await;
    }
}

/// The periodic task shared by both session kinds.
pub(crate) struct FrameLoop {
    label: &'static str,
    cursor: SharedCursor,
    broadcaster: Arc<Broadcaster>,
    /// Live sessions drive hardware and report status; preview does neither.
    sink: Option<Arc<dyn PixelSink>>,
    channels: Arc<[Channel]>,
    timer: FrameTimer,
}

impl FrameLoop {
    /// Renders and delivers one frame. Returns false once the session has
    /// been cleared.
    fn tick(&self) -> Result<bool> {
        let Some((play, channels, cue_index, elapsed, blackout)) =
            lock_cursor(&self.cursor)?.as_ref().map(|cursor| {
                (
                    Arc::clone(&cursor.play),
                    Arc::clone(&cursor.channels),
                    cursor.cue_index,
                    cursor.clock.elapsed_secs(),
                    cursor.blackout,
                )
            })
        else {
            return Ok(false);
        };

        let frame = if blackout {
            Frame::black(&channels)
        } else {
            build_frame(&play, &channels, cue_index, elapsed)
        };

        if let Some(sink) = &self.sink {
            if blackout {
                sink.all_off(&channels)?;
            } else {
                for channel in channels.iter() {
                    let pixels = frame.pixels(&channel.id).unwrap_or_default();
                    sink.write_channel(channel.gpio_pin, channel.led_count, channel.color_order, pixels)?;
                }
            }
        }

        self.broadcaster.broadcast(&Message::Frame(frame))?;
        Ok(true)
    }

    async fn run(self, mut cancelled: watch::Receiver<bool>) {
        info!(session = self.label, interval = ?self.timer.interval(), "frame loop started");
        let outcome = loop {
            if *cancelled.borrow() {
                break Ok(());
            }
            let started = Instant::now();
            match self.guarded_tick() {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
            let spent = started.elapsed();
            if self.timer.overran(spent) {
                debug!(session = self.label, ?spent, "frame overran its interval");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.timer.pause_after(spent)) => {}
                _ = cancelled.changed() => break Ok(()),
            }
        };

        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match outcome {
            Ok(()) => {
                info!(session = self.label, "frame loop finished");
                self.publish(&Message::Done);
            }
            Err(err) => {
                error!(session = self.label, %err, "frame loop failed; session stopped");
                if let Some(sink) = &self.sink {
                    if let Err(err) = sink.all_off(&self.channels) {
                        warn!(session = self.label, %err, "could not darken hardware after failure");
                    }
                }
                self.publish(&Message::error(err.to_string()));
                if self.sink.is_some() {
                    self.publish(&Message::Status(LiveStatus::idle()));
                }
            }
        }
    }

    /// Runs one tick, turning a panic into an ordinary loop failure.
    fn guarded_tick(&self) -> Result<bool> {
        panic::catch_unwind(AssertUnwindSafe(|| self.tick()))
            .unwrap_or_else(|payload| Err(PiLitesError::msg(panic_message(payload.as_ref()))))
    }

    fn publish(&self, message: &Message) {
        if let Err(err) = self.broadcaster.broadcast(message) {
            warn!(session = self.label, %err, "failed to publish session message");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|reason| reason.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("frame task panicked: {reason}")
}
