use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    effects::{self, seed_for_id},
    model::{Channel, Play},
    timeline::wall_clock_secs,
    tracking, Rgb,
};

/// One pixel buffer per channel id.
pub type ChannelBuffers = BTreeMap<String, Vec<Rgb>>;

/// A rendered snapshot of every channel at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Wall-clock seconds since the Unix epoch.
    pub timestamp: f64,
    pub channels: ChannelBuffers,
}

impl Frame {
    pub fn new(channels: ChannelBuffers) -> Self {
        Self {
            timestamp: wall_clock_secs(),
            channels,
        }
    }

    /// An all-black frame sized to the given channels.
    pub fn black(channels: &[Channel]) -> Self {
        Self::new(black_buffers(channels))
    }

    pub fn pixels(&self, channel_id: &str) -> Option<&[Rgb]> {
        self.channels.get(channel_id).map(Vec::as_slice)
    }
}

pub(crate) fn black_buffers(channels: &[Channel]) -> ChannelBuffers {
    channels
        .iter()
        .map(|channel| (channel.id.clone(), vec![Rgb::BLACK; channel.led_count]))
        .collect()
}

/// Renders the pixel buffers for `cue_index` at `elapsed_sec` seconds into
/// the cue.
///
/// Every buffer starts black. Each region the cue owns or tracks is filled
/// from its resolved effect, in range order. Regions on unknown channels are
/// skipped, and an effect that fails leaves its region black for this frame
/// without affecting the others.
///
/// Randomized effects are seeded from the id of the effect that owns the
/// region, so a tracked effect keeps the phase it had in its owning cue and
/// a new cue's effects start from their own seeds.
pub fn compose(play: &Play, channels: &[Channel], cue_index: usize, elapsed_sec: f64) -> ChannelBuffers {
    let mut buffers = black_buffers(channels);
    let Some(cue) = play.cues.get(cue_index) else {
        return buffers;
    };

    for region in play.regions.iter().filter(|region| cue.references(&region.id)) {
        let Some(resolved) = tracking::resolve(play, cue_index, &region.id) else {
            continue;
        };
        let Some(buffer) = buffers.get_mut(&region.channel_id) else {
            debug!(region = %region.id, channel = %region.channel_id, "region on unknown channel");
            continue;
        };

        let effect = resolved.effect;
        let pixel_count = region.pixel_count();
        let pixels = match effects::try_render(
            &effect.kind,
            &effect.params,
            elapsed_sec,
            pixel_count,
            seed_for_id(&effect.id),
        ) {
            Ok(pixels) => pixels,
            Err(err) => {
                debug!(region = %region.id, effect = %effect.id, %err, "region degraded to black");
                continue;
            }
        };

        for (position, pixel) in region.positions().zip(pixels) {
            if let Some(slot) = buffer.get_mut(position) {
                *slot = pixel;
            }
        }
    }
    buffers
}

/// Builds a timestamped frame for `cue_index` at `elapsed_sec`.
pub fn build_frame(play: &Play, channels: &[Channel], cue_index: usize, elapsed_sec: f64) -> Frame {
    Frame::new(compose(play, channels, cue_index, elapsed_sec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures::*, Effect, Params};

    const RED: Rgb = Rgb::new(255, 0, 0);
    const GREEN: Rgb = Rgb::new(0, 255, 0);

    fn single_region_play(ranges: &[(usize, usize)], effect: Effect) -> Play {
        Play {
            id: "p".into(),
            name: "P".into(),
            regions: vec![region("r", "ch-1", ranges)],
            cues: vec![cue("c", vec![("r", effect)], &[])],
        }
    }

    #[test]
    fn unassigned_pixels_stay_black() {
        let effect = static_color("e", "#ffffff");
        let play = single_region_play(&[(10, 19)], effect.clone());
        let frame = build_frame(&play, &[channel("ch-1", 30)], 0, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert_eq!(pixels.len(), 30);
        assert!(pixels[..10].iter().all(|&p| p == Rgb::BLACK));
        assert!(pixels[20..].iter().all(|&p| p == Rgb::BLACK));
        let expected = effects::render(&effect.kind, &effect.params, 0.0, 10, 0);
        assert_eq!(&pixels[10..20], expected.as_slice());
    }

    #[test]
    fn multi_range_region_fills_each_range() {
        let play = single_region_play(&[(0, 4), (20, 24)], static_color("e", "#ffffff"));
        let frame = build_frame(&play, &[channel("ch-1", 30)], 0, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert!(pixels[0..=4].iter().all(|&p| p == Rgb::WHITE));
        assert!(pixels[5..=19].iter().all(|&p| p == Rgb::BLACK));
        assert!(pixels[20..=24].iter().all(|&p| p == Rgb::WHITE));
        assert!(pixels[25..].iter().all(|&p| p == Rgb::BLACK));
    }

    #[test]
    fn region_pixels_follow_range_order() {
        let mut params = Params::new();
        params.insert("startColor".into(), "#ff0000".into());
        params.insert("endColor".into(), "#0000ff".into());
        let play = single_region_play(&[(8, 9), (0, 1)], Effect::new("g", "gradient", params));
        let frame = build_frame(&play, &[channel("ch-1", 10)], 0, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert_eq!(pixels[8], RED);
        assert_eq!(pixels[1], Rgb::new(0, 0, 255));
    }

    #[test]
    fn tracking_cues_inherit_earlier_effects() {
        let play = tracking_play();
        let frame = build_frame(&play, &[channel("ch-1", 100)], 2, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert!(pixels[..50].iter().all(|&p| p == RED));
        assert!(pixels[50..].iter().all(|&p| p == GREEN));
    }

    #[test]
    fn regions_absent_from_cue_render_black() {
        let mut play = tracking_play();
        play.cues[2].tracking_regions.remove("r-1");
        let frame = build_frame(&play, &[channel("ch-1", 100)], 2, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert!(pixels[..50].iter().all(|&p| p == Rgb::BLACK));
        assert!(pixels[50..].iter().all(|&p| p == GREEN));
    }

    #[test]
    fn unknown_channel_is_skipped() {
        let mut play = tracking_play();
        play.regions[0].channel_id = "ch-missing".into();
        let frame = build_frame(&play, &[channel("ch-1", 100)], 0, 0.0);

        assert_eq!(frame.channels.len(), 1);
        assert!(frame.pixels("ch-1").unwrap()[..50].iter().all(|&p| p == Rgb::BLACK));
    }

    #[test]
    fn failing_effect_blacks_out_only_its_region() {
        let mut play = tracking_play();
        play.cues[0]
            .effects_by_region
            .insert("r-1".into(), static_color("e-bad", "#zzzzzz"));
        let frame = build_frame(&play, &[channel("ch-1", 100)], 0, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();

        assert!(pixels[..50].iter().all(|&p| p == Rgb::BLACK));
        assert!(pixels[50..].iter().all(|&p| p == Rgb::new(0, 0, 255)));
    }

    #[test]
    fn ranges_past_the_strip_are_clipped() {
        let play = single_region_play(&[(8, 14)], static_color("e", "#ffffff"));
        let frame = build_frame(&play, &[channel("ch-1", 10)], 0, 0.0);
        let pixels = frame.pixels("ch-1").unwrap();
        assert_eq!(pixels.len(), 10);
        assert_eq!(pixels[9], Rgb::WHITE);
    }

    #[test]
    fn tracked_random_effect_keeps_its_seed() {
        let mut params = Params::new();
        params.insert("density".into(), 0.5.into());
        let twinkle = Effect::new("tw-1", "twinkle", params);
        let play = Play {
            id: "p".into(),
            name: "P".into(),
            regions: vec![region("r", "ch-1", &[(0, 39)])],
            cues: vec![
                cue("c0", vec![("r", twinkle)], &[]),
                cue("c1", vec![], &["r"]),
            ],
        };
        let channels = [channel("ch-1", 40)];

        let owned = compose(&play, &channels, 0, 1.3);
        let tracked = compose(&play, &channels, 1, 1.3);
        assert_eq!(owned, tracked);
    }

    #[test]
    fn black_frame_matches_channel_sizes() {
        let frame = Frame::black(&[channel("a", 3), channel("b", 5)]);
        assert_eq!(frame.pixels("a").unwrap(), &[Rgb::BLACK; 3]);
        assert_eq!(frame.pixels("b").unwrap().len(), 5);
        assert!(frame.timestamp > 0.0);
    }
}
