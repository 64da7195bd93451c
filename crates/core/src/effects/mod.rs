//! Effect renderer: maps (params, elapsed time, pixel count, seed) to pixels.
//!
//! Every effect is a pure function of its inputs. Randomized effects draw
//! from [`noise`] generators keyed by the caller's seed, never from a shared
//! generator, so two renders with the same arguments are identical.

mod noise;

use std::{f64::consts::TAU, fmt, str::FromStr};

use serde_json::Value;
use tracing::warn;

use crate::{
    color::{hex_to_rgb, hsv_to_rgb},
    model::Params,
    PiLitesError, Result, Rgb,
};

pub use noise::seed_for_id;
use noise::Rng64;

/// The closed catalog of effects the renderer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    StaticColor,
    FadeIn,
    FadeOut,
    ColorWash,
    Pulse,
    Strobe,
    Gradient,
    Chase,
    Rainbow,
    Twinkle,
    Lightning,
}

impl EffectKind {
    pub const ALL: [EffectKind; 11] = [
        EffectKind::StaticColor,
        EffectKind::FadeIn,
        EffectKind::FadeOut,
        EffectKind::ColorWash,
        EffectKind::Pulse,
        EffectKind::Strobe,
        EffectKind::Gradient,
        EffectKind::Chase,
        EffectKind::Rainbow,
        EffectKind::Twinkle,
        EffectKind::Lightning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::StaticColor => "static_color",
            EffectKind::FadeIn => "fade_in",
            EffectKind::FadeOut => "fade_out",
            EffectKind::ColorWash => "color_wash",
            EffectKind::Pulse => "pulse",
            EffectKind::Strobe => "strobe",
            EffectKind::Gradient => "gradient",
            EffectKind::Chase => "chase",
            EffectKind::Rainbow => "rainbow",
            EffectKind::Twinkle => "twinkle",
            EffectKind::Lightning => "lightning",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn render(
        self,
        params: &Params,
        elapsed_sec: f64,
        pixel_count: usize,
        seed: u64,
    ) -> Result<Vec<Rgb>> {
        if pixel_count == 0 {
            return Ok(Vec::new());
        }
        let args = Args { kind: self, params };
        let t = if elapsed_sec.is_finite() { elapsed_sec } else { 0.0 };
        match self {
            EffectKind::StaticColor => static_color(&args, pixel_count),
            EffectKind::FadeIn => fade_in(&args, t, pixel_count),
            EffectKind::FadeOut => fade_out(&args, t, pixel_count),
            EffectKind::ColorWash => color_wash(&args, t, pixel_count),
            EffectKind::Pulse => pulse(&args, t, pixel_count),
            EffectKind::Strobe => strobe(&args, t, pixel_count),
            EffectKind::Gradient => gradient(&args, pixel_count),
            EffectKind::Chase => chase(&args, t, pixel_count),
            EffectKind::Rainbow => rainbow(&args, t, pixel_count),
            EffectKind::Twinkle => twinkle(&args, t, pixel_count, seed),
            EffectKind::Lightning => lightning(&args, t, pixel_count, seed),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = PiLitesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| PiLitesError::config(format!("unknown effect type `{s}`")))
    }
}

/// Renders an effect by type name. Unknown types produce black rather than
/// an error; malformed parameters are reported.
pub fn try_render(
    effect_type: &str,
    params: &Params,
    elapsed_sec: f64,
    pixel_count: usize,
    seed: u64,
) -> Result<Vec<Rgb>> {
    match EffectKind::from_name(effect_type) {
        Some(kind) => kind.render(params, elapsed_sec, pixel_count, seed),
        None => Ok(vec![Rgb::BLACK; pixel_count]),
    }
}

/// Infallible variant of [`try_render`]: any failure yields `pixel_count`
/// black pixels.
pub fn render(
    effect_type: &str,
    params: &Params,
    elapsed_sec: f64,
    pixel_count: usize,
    seed: u64,
) -> Vec<Rgb> {
    try_render(effect_type, params, elapsed_sec, pixel_count, seed).unwrap_or_else(|err| {
        warn!(effect = effect_type, %err, "effect failed; rendering black");
        vec![Rgb::BLACK; pixel_count]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Typed access to an effect's loose parameter map.
struct Args<'a> {
    kind: EffectKind,
    params: &'a Params,
}

impl Args<'_> {
    fn number(&self, key: &str, default: f64) -> Result<f64> {
        let value = match self.params.get(key) {
            None | Some(Value::Null) => return Ok(default),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.invalid(key)),
        }
    }

    fn color(&self, key: &str, default: Rgb) -> Result<Rgb> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::String(s)) => hex_to_rgb(s).map_err(|_| self.invalid(key)),
            Some(_) => Err(self.invalid(key)),
        }
    }

    fn direction(&self) -> Direction {
        match self.params.get("direction").and_then(Value::as_str) {
            Some("reverse") => Direction::Reverse,
            _ => Direction::Forward,
        }
    }

    /// Elapsed time shifted by `offsetSec`, held at zero until the offset.
    fn adjusted(&self, t: f64) -> Result<f64> {
        Ok((t - self.number("offsetSec", 0.0)?).max(0.0))
    }

    fn background(&self) -> Result<Rgb> {
        self.color("backgroundColor", Rgb::BLACK)
    }

    fn invalid(&self, key: &str) -> PiLitesError {
        let shown = self
            .params
            .get(key)
            .map(Value::to_string)
            .unwrap_or_default();
        PiLitesError::render(self.kind.name(), format!("invalid `{key}` parameter {shown}"))
    }
}

fn uniform(pixel: Rgb, pixel_count: usize) -> Result<Vec<Rgb>> {
    Ok(vec![pixel; pixel_count])
}

/// Fraction of a ramp completed at `adjusted` seconds.
fn ramp(adjusted: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        (adjusted / duration).min(1.0)
    } else {
        1.0
    }
}

fn static_color(args: &Args<'_>, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let intensity = args.number("intensity", 1.0)?;
    uniform(color.scale(intensity), n)
}

fn fade_in(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let duration = args.number("durationSec", 1.0)?;
    let progress = ramp(args.adjusted(t)?, duration);
    uniform(color.scale(progress), n)
}

fn fade_out(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let from = args.color("fromColor", Rgb::WHITE)?;
    let duration = args.number("durationSec", 1.0)?;
    let progress = ramp(args.adjusted(t)?, duration);
    uniform(from.scale(1.0 - progress), n)
}

fn color_wash(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let intensity = args.number("intensity", 1.0)?;
    let speed = args.number("speed", 1.0)?;
    let modulation = 0.85 + 0.15 * (TAU * speed * t).sin();
    uniform(color.scale(intensity * modulation), n)
}

fn pulse(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let bg = args.background()?;
    let speed = args.number("speed", 1.0)?;
    let min = args.number("minIntensity", 0.1)?;
    let max = args.number("maxIntensity", 1.0)?;
    let phase = 0.5 - 0.5 * (TAU * speed * args.adjusted(t)?).cos();
    uniform(bg.lerp(color, min + phase * (max - min)), n)
}

fn strobe(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let rate = args.number("rate", 8.0)?;
    let duty_cycle = args.number("dutyCycle", 0.5)?;
    let period = if rate > 0.0 { 1.0 / rate } else { 1.0 };
    let phase = args.adjusted(t)?.rem_euclid(period) / period;
    uniform(if phase < duty_cycle { color } else { Rgb::BLACK }, n)
}

fn gradient(args: &Args<'_>, n: usize) -> Result<Vec<Rgb>> {
    let start = args.color("startColor", Rgb::WHITE)?;
    let end = args.color("endColor", Rgb::BLACK)?;
    let reverse = args.direction() == Direction::Reverse;
    let span = n.saturating_sub(1).max(1) as f64;
    Ok((0..n)
        .map(|i| {
            let t = i as f64 / span;
            start.lerp(end, if reverse { 1.0 - t } else { t })
        })
        .collect())
}

fn chase(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let bg = args.background()?;
    let speed = args.number("speed", 1.0)?;
    let adjusted = args.adjusted(t)?;

    let window = (n / 10).max(1) as i64;
    let mut travel = adjusted * speed * n as f64 / 4.0;
    if args.direction() == Direction::Reverse {
        travel = -travel;
    }
    let len = n as i64;
    let head = (travel.trunc() as i64).rem_euclid(len);
    Ok((0..len)
        .map(|i| {
            if (i - head).rem_euclid(len) < window {
                color
            } else {
                bg
            }
        })
        .collect())
}

fn rainbow(args: &Args<'_>, t: f64, n: usize) -> Result<Vec<Rgb>> {
    let speed = args.number("speed", 1.0)?;
    let intensity = args.number("intensity", 1.0)?;
    let reverse = args.direction() == Direction::Reverse;
    let scroll = args.adjusted(t)? * speed * 0.1;
    Ok((0..n)
        .map(|i| {
            let position = i as f64 / n as f64;
            let base = if reverse { 1.0 - position } else { position };
            hsv_to_rgb((base + scroll).rem_euclid(1.0), 1.0, 1.0).scale(intensity)
        })
        .collect())
}

fn twinkle(args: &Args<'_>, t: f64, n: usize, seed: u64) -> Result<Vec<Rgb>> {
    let color = args.color("color", Rgb::WHITE)?;
    let bg = args.background()?;
    let density = args.number("density", 0.3)?;
    let speed = args.number("speed", 1.0)?;
    // Slots last 1 / (4 * speed) seconds.
    let slot = (args.adjusted(t)? * speed * 4.0).floor().max(0.0) as u64;
    Ok((0..n as u64)
        .map(|i| {
            let mut rng = Rng64::for_cell(seed, i, slot);
            if rng.next_f64() < density {
                bg.lerp(color, rng.next_f64())
            } else {
                bg
            }
        })
        .collect())
}

fn lightning(args: &Args<'_>, t: f64, n: usize, seed: u64) -> Result<Vec<Rgb>> {
    let flash = args.color("flashColor", Rgb::WHITE)?;
    let bg = args.background()?;
    let intensity = args.number("intensity", 1.0)?;
    let strike_rate = args.number("strikeRate", 12.0)?;
    let decay_sec = args.number("decaySec", 0.2)?;
    let adjusted = args.adjusted(t)?;

    let strikes_per_sec = strike_rate / 60.0;
    if strikes_per_sec <= 0.0 || decay_sec <= 0.0 {
        return uniform(bg, n);
    }

    // One strike opportunity per bucket of 60 / strikeRate seconds. Float to
    // int casts saturate, so extreme rates only hit the lookback cap.
    let current = (adjusted * strikes_per_sec).floor() as i64;
    let lookback = ((decay_sec * strikes_per_sec).ceil() as i64)
        .saturating_add(1)
        .clamp(1, MAX_LIGHTNING_LOOKBACK);
    let chance = strikes_per_sec / 30.0;

    let mut brightness: f64 = 0.0;
    for bucket in current.saturating_sub(lookback).max(0)..=current {
        let mut rng = Rng64::for_cell(seed, bucket as u64, 0);
        if rng.next_f64() >= chance {
            continue;
        }
        let age = adjusted - bucket as f64 / strikes_per_sec;
        brightness = brightness.max(strike_brightness(age, decay_sec, intensity));
    }
    uniform(bg.lerp(flash, brightness), n)
}

/// Upper bound on the strike buckets inspected per frame.
const MAX_LIGHTNING_LOOKBACK: i64 = 256;

/// Brightness of one strike `age` seconds after it hit; zero outside its
/// decay window.
fn strike_brightness(age: f64, decay_sec: f64, intensity: f64) -> f64 {
    if (0.0..=decay_sec).contains(&age) {
        intensity * (-age / (decay_sec * 0.4)).exp()
    } else {
        0.0
    }
}
