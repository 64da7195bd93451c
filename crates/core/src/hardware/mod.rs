use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use tracing::{info, warn};

use crate::{
    model::{Channel, ColorOrder},
    PiLitesError, Result, Rgb,
};

impl ColorOrder {
    /// Reorders a logical RGB pixel into the strip's wire byte order. The
    /// white byte of four-channel strips is not driven.
    pub fn reorder(self, pixel: Rgb) -> [u8; 3] {
        match self {
            ColorOrder::Rgb | ColorOrder::Rgbw => [pixel.r, pixel.g, pixel.b],
            ColorOrder::Grb | ColorOrder::Grbw => [pixel.g, pixel.r, pixel.b],
        }
    }
}

/// Physical pixel output. One strip per GPIO pin.
pub trait PixelSink: Send + Sync {
    fn write_channel(
        &self,
        gpio_pin: u8,
        led_count: usize,
        color_order: ColorOrder,
        pixels: &[Rgb],
    ) -> Result<()>;

    /// Drives every channel to black. Keeps going past individual failures
    /// and reports the first one.
    fn all_off(&self, channels: &[Channel]) -> Result<()> {
        let mut first_error = None;
        for channel in channels {
            let black = vec![Rgb::BLACK; channel.led_count];
            if let Err(err) =
                self.write_channel(channel.gpio_pin, channel.led_count, channel.color_order, &black)
            {
                warn!(channel = %channel.id, %err, "all_off failed for channel");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn close(&self) -> Result<()>;
}

/// In-memory sink that records the wire bytes each strip would receive.
#[derive(Debug, Default)]
pub struct MockSink {
    strips: Mutex<BTreeMap<u8, Vec<[u8; 3]>>>,
    writes: AtomicUsize,
    closed: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last bytes written to the strip on `gpio_pin`.
    pub fn strip(&self, gpio_pin: u8) -> Option<Vec<[u8; 3]>> {
        self.lock().ok()?.get(&gpio_pin).cloned()
    }

    /// True if every strip written so far is entirely dark.
    pub fn is_dark(&self) -> bool {
        self.lock()
            .map(|strips| strips.values().flatten().all(|bytes| *bytes == [0, 0, 0]))
            .unwrap_or(false)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<u8, Vec<[u8; 3]>>>> {
        self.strips
            .lock()
            .map_err(|_| PiLitesError::msg("mock strips have been poisoned"))
    }
}

impl PixelSink for MockSink {
    fn write_channel(
        &self,
        gpio_pin: u8,
        led_count: usize,
        color_order: ColorOrder,
        pixels: &[Rgb],
    ) -> Result<()> {
        if self.is_closed() {
            return Err(PiLitesError::Hardware("sink is closed".into()));
        }
        let mut wire = vec![[0u8; 3]; led_count];
        for (slot, pixel) in wire.iter_mut().zip(pixels) {
            *slot = color_order.reorder(*pixel);
        }
        self.lock()?.insert(gpio_pin, wire);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        for strip in self.lock()?.values_mut() {
            strip.fill([0, 0, 0]);
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Picks the pixel sink. Only the mock sink is built into this crate; a
/// request for real hardware falls back to it with a warning.
pub fn create_sink(mock: bool) -> Arc<dyn PixelSink> {
    if mock {
        info!("using mock hardware sink");
    } else {
        warn!("no LED driver available on this host; falling back to mock hardware");
    }
    Arc::new(MockSink::new())
}
