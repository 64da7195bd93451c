//! Service object that ties the store, the hardware sink and the two
//! sessions together. Outer surfaces (CLI, HTTP, websockets) talk only to
//! [`Controller`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    broadcast::{Broadcaster, Subscription},
    config::AppConfig,
    hardware::PixelSink,
    model::{Channel, Play, PlaySummary},
    session::{LiveSession, LiveStatus, PreviewSession, PreviewStatus},
    storage::PlayStore,
    PiLitesError, Result, Rgb,
};

/// Pending auto-clear timers of lit test channels, keyed by channel id.
type TestTimers = HashMap<String, JoinHandle<()>>;

pub struct Controller {
    config: AppConfig,
    store: Arc<dyn PlayStore>,
    sink: Arc<dyn PixelSink>,
    preview: PreviewSession,
    live: LiveSession,
    test_timers: Mutex<TestTimers>,
}

impl Controller {
    pub fn new(config: AppConfig, store: Arc<dyn PlayStore>, sink: Arc<dyn PixelSink>) -> Self {
        Self {
            config,
            store,
            preview: PreviewSession::new(Arc::new(Broadcaster::new("preview"))),
            live: LiveSession::new(Arc::new(Broadcaster::new("live")), Arc::clone(&sink)),
            sink,
            test_timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn list_plays(&self) -> Result<Vec<PlaySummary>> {
        self.store.list_plays()
    }

    /// Loads a play with the channel set and checks both before a session
    /// may see them.
    fn load(&self, play_id: &str) -> Result<(Arc<Play>, Arc<[Channel]>)> {
        let play = self.store.load_play(play_id)?;
        play.validate()?;
        let channels = self.store.load_channels()?;
        for channel in &channels {
            channel.validate()?;
        }
        Ok((Arc::new(play), channels.into()))
    }

    pub async fn start_preview(&self, play_id: &str) -> Result<()> {
        let (play, channels) = self.load(play_id)?;
        self.clear_channel_tests(&channels)?;
        self.preview
            .start(play, channels, self.config.fps_target)
            .await
    }

    pub fn advance_preview(&self) -> Result<()> {
        self.preview.advance()
    }

    pub async fn stop_preview(&self) -> Result<()> {
        self.preview.stop().await
    }

    pub fn preview_status(&self) -> Result<PreviewStatus> {
        self.preview.status()
    }

    pub fn subscribe_preview(&self) -> Result<Subscription> {
        self.preview.broadcaster().subscribe()
    }

    pub async fn start_live(&self, play_id: &str) -> Result<()> {
        let (play, channels) = self.load(play_id)?;
        self.clear_channel_tests(&channels)?;
        self.live.start(play, channels, self.config.fps_target).await
    }

    pub fn advance_live(&self) -> Result<()> {
        self.live.advance()
    }

    pub fn blackout_live(&self) -> Result<()> {
        self.live.blackout()
    }

    pub async fn stop_live(&self) -> Result<()> {
        self.live.stop().await
    }

    pub fn live_status(&self) -> Result<LiveStatus> {
        self.live.status()
    }

    /// The subscription's first message is the current live status.
    pub fn subscribe_live(&self) -> Result<Subscription> {
        self.live.subscribe()
    }

    pub fn preview_broadcaster(&self) -> &Arc<Broadcaster> {
        self.preview.broadcaster()
    }

    pub fn live_broadcaster(&self) -> &Arc<Broadcaster> {
        self.live.broadcaster()
    }

    fn channel(&self, channel_id: &str) -> Result<Channel> {
        self.store
            .load_channels()?
            .into_iter()
            .find(|channel| channel.id == channel_id)
            .ok_or_else(|| PiLitesError::NotFound(format!("channel `{channel_id}`")))
    }

    fn timers(&self) -> Result<MutexGuard<'_, TestTimers>> {
        self.test_timers
            .lock()
            .map_err(|_| PiLitesError::msg("test timers have been poisoned"))
    }

    /// Lights a whole channel white so an installer can find it. The channel
    /// goes dark again after `hardware_test_timeout_sec`; testing it again
    /// restarts the countdown. Refused while live playback owns the strips.
    pub async fn test_channel(&self, channel_id: &str) -> Result<()> {
        if self.live.is_running()? {
            return Err(PiLitesError::conflict("live playback is driving the hardware"));
        }
        let channel = self.channel(channel_id)?;
        self.sink.write_channel(
            channel.gpio_pin,
            channel.led_count,
            channel.color_order,
            &vec![Rgb::WHITE; channel.led_count],
        )?;

        let timeout = Duration::from_secs(u64::from(self.config.hardware_test_timeout_sec));
        info!(channel = %channel.id, ?timeout, "hardware test started");
        let id = channel.id.clone();
        let sink = Arc::clone(&self.sink);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            info!(channel = %channel.id, "hardware test auto-clear");
            if let Err(err) = sink.all_off(std::slice::from_ref(&channel)) {
                warn!(channel = %channel.id, %err, "hardware test auto-clear failed");
            }
        });
        if let Some(previous) = self.timers()?.insert(id, timer) {
            previous.abort();
        }
        Ok(())
    }

    /// Turns a test channel off now and cancels its countdown.
    pub fn clear_test_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.channel(channel_id)?;
        if let Some(timer) = self.timers()?.remove(channel_id) {
            timer.abort();
        }
        self.sink.all_off(std::slice::from_ref(&channel))
    }

    /// Number of test channels still waiting for their auto-clear.
    pub fn active_channel_tests(&self) -> Result<usize> {
        Ok(self
            .timers()?
            .values()
            .filter(|timer| !timer.is_finished())
            .count())
    }

    /// Cancels every pending test and, unless live playback owns the strips,
    /// darkens them before a session takes over.
    fn clear_channel_tests(&self, channels: &[Channel]) -> Result<()> {
        for (_, timer) in self.timers()?.drain() {
            timer.abort();
        }
        if !self.live.is_running()? {
            self.sink.all_off(channels)?;
        }
        Ok(())
    }

    /// Stops both sessions and releases the hardware, leaving it dark.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down controller");
        for (_, timer) in self.timers()?.drain() {
            timer.abort();
        }
        self.preview.stop().await?;
        self.live.shutdown().await
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("preview", &self.preview)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}
