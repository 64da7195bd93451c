use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{PiLitesError, Result};

/// GPIO pins that can drive a PWM/PCM LED strip.
pub const VALID_GPIO_PINS: [u8; 4] = [12, 13, 18, 19];

/// Free-form effect parameters, keyed by the camelCase names the editor uses.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Inclusive, 0-based, channel-local pixel span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRange {
    pub start: usize,
    pub end: usize,
}

impl PixelRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Pixel count; a range always covers at least one pixel.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(PiLitesError::config(format!(
                "range [{}, {}] ends before it starts",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Wire byte order of a strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorOrder {
    Rgb,
    Grb,
    Rgbw,
    Grbw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub gpio_pin: u8,
    pub led_count: usize,
    pub led_type: String,
    pub color_order: ColorOrder,
}

impl Channel {
    pub fn validate(&self) -> Result<()> {
        if !VALID_GPIO_PINS.contains(&self.gpio_pin) {
            return Err(PiLitesError::config(format!(
                "channel `{}`: gpioPin {} is not one of {:?}",
                self.id, self.gpio_pin, VALID_GPIO_PINS
            )));
        }
        if self.led_count < 1 {
            return Err(PiLitesError::config(format!(
                "channel `{}`: ledCount must be >= 1",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

impl Effect {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub name: String,
    pub channel_id: String,
    pub ranges: Vec<PixelRange>,
}

impl Region {
    /// Number of pixels across all ranges.
    pub fn pixel_count(&self) -> usize {
        self.ranges.iter().map(PixelRange::len).sum()
    }

    /// Channel-local pixel positions in range order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|range| range.start..=range.end)
    }

    pub fn validate(&self) -> Result<()> {
        for range in &self.ranges {
            range.validate()?;
        }
        let mut sorted = self.ranges.clone();
        sorted.sort_by_key(|range| range.start);
        for pair in sorted.windows(2) {
            if pair[0].end >= pair[1].start {
                return Err(PiLitesError::config(format!(
                    "region `{}`: ranges overlap: [{},{}] and [{},{}]",
                    self.id, pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    pub id: String,
    pub name: String,
    /// Regions this cue owns, with the effect it assigns to each.
    #[serde(default)]
    pub effects_by_region: BTreeMap<String, Effect>,
    /// Regions that keep whatever an earlier cue assigned.
    #[serde(default)]
    pub tracking_regions: BTreeSet<String>,
}

impl Cue {
    pub fn owns(&self, region_id: &str) -> bool {
        self.effects_by_region.contains_key(region_id)
    }

    /// True if the region shows anything at all during this cue.
    pub fn references(&self, region_id: &str) -> bool {
        self.owns(region_id) || self.tracking_regions.contains(region_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Play {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub cues: Vec<Cue>,
}

impl Play {
    pub fn region(&self, region_id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.id == region_id)
    }

    pub fn summary(&self) -> PlaySummary {
        PlaySummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Checks the structural invariants a session relies on. Sessions assume
    /// a play that passed this check.
    pub fn validate(&self) -> Result<()> {
        if self.cues.is_empty() {
            return Err(PiLitesError::config(format!("play `{}` has no cues", self.id)));
        }
        for region in &self.regions {
            region.validate()?;
        }
        for cue in &self.cues {
            if let Some(region_id) = cue
                .tracking_regions
                .iter()
                .find(|region_id| cue.owns(region_id))
            {
                return Err(PiLitesError::config(format!(
                    "cue `{}` both assigns and tracks region `{region_id}`",
                    cue.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaySummary {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn channel(id: &str, led_count: usize) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("Strand {id}"),
            gpio_pin: 18,
            led_count,
            led_type: "ws281x".to_string(),
            color_order: ColorOrder::Rgb,
        }
    }

    pub fn region(id: &str, channel_id: &str, ranges: &[(usize, usize)]) -> Region {
        Region {
            id: id.to_string(),
            name: id.to_uppercase(),
            channel_id: channel_id.to_string(),
            ranges: ranges
                .iter()
                .map(|&(start, end)| PixelRange::new(start, end))
                .collect(),
        }
    }

    pub fn static_color(id: &str, color: &str) -> Effect {
        let mut params = Params::new();
        params.insert("color".into(), color.into());
        params.insert("intensity".into(), 1.0.into());
        Effect::new(id, "static_color", params)
    }

    pub fn cue(id: &str, owned: Vec<(&str, Effect)>, tracking: &[&str]) -> Cue {
        Cue {
            id: id.to_string(),
            name: format!("Cue {id}"),
            effects_by_region: owned
                .into_iter()
                .map(|(region, effect)| (region.to_string(), effect))
                .collect(),
            tracking_regions: tracking.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Two halves of a 100-pixel strand; cue 0 owns both, cue 1 keeps the
    /// left half and recolours the right, cue 2 tracks both.
    pub fn tracking_play() -> Play {
        Play {
            id: "play-1".into(),
            name: "Test Play".into(),
            regions: vec![
                region("r-1", "ch-1", &[(0, 49)]),
                region("r-2", "ch-1", &[(50, 99)]),
            ],
            cues: vec![
                cue(
                    "cue-0",
                    vec![
                        ("r-1", static_color("e-1", "#ff0000")),
                        ("r-2", static_color("e-2", "#0000ff")),
                    ],
                    &[],
                ),
                cue("cue-1", vec![("r-2", static_color("e-3", "#00ff00"))], &["r-1"]),
                cue("cue-2", vec![], &["r-1", "r-2"]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn reads_camel_case_documents() {
        let json = r##"{
            "id": "p", "name": "Show",
            "regions": [{"id": "r", "name": "R", "channelId": "ch", "ranges": [{"start": 0, "end": 4}]}],
            "cues": [{"id": "c", "name": "C",
                      "effectsByRegion": {"r": {"id": "e", "type": "static_color", "params": {"color": "#ff0000"}}},
                      "trackingRegions": []}]
        }"##;
        let play: Play = serde_json::from_str(json).unwrap();
        assert_eq!(play.regions[0].channel_id, "ch");
        assert_eq!(play.cues[0].effects_by_region["r"].kind, "static_color");
        play.validate().unwrap();
    }

    #[test]
    fn channel_rejects_unknown_pin_and_empty_strip() {
        let mut ch = channel("ch", 10);
        ch.validate().unwrap();
        ch.gpio_pin = 4;
        assert!(ch.validate().is_err());
        ch.gpio_pin = 12;
        ch.led_count = 0;
        assert!(ch.validate().is_err());
    }

    #[test]
    fn unknown_color_order_fails_to_parse() {
        let json = r#"{"id":"c","name":"n","gpioPin":18,"ledCount":1,"ledType":"ws281x","colorOrder":"BRG"}"#;
        assert!(serde_json::from_str::<Channel>(json).is_err());
    }

    #[test]
    fn region_counts_pixels_across_ranges() {
        let r = region("r", "ch", &[(0, 4), (20, 24)]);
        assert_eq!(r.pixel_count(), 10);
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 20, 21, 22, 23, 24]);
        r.validate().unwrap();
    }

    #[test]
    fn region_rejects_overlap() {
        let r = region("r", "ch", &[(10, 20), (0, 10)]);
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("overlap"));
        assert!(region("r", "ch", &[(5, 4)]).validate().is_err());
    }

    #[test]
    fn play_rejects_region_both_owned_and_tracked() {
        let mut play = tracking_play();
        play.validate().unwrap();
        play.cues[1].tracking_regions.insert("r-2".into());
        let err = play.validate().unwrap_err();
        assert!(err.to_string().contains("r-2"));
    }

    #[test]
    fn play_without_cues_is_invalid() {
        let play = Play {
            id: "empty".into(),
            ..Play::default()
        };
        assert!(matches!(play.validate(), Err(PiLitesError::Config(_))));
    }
}
