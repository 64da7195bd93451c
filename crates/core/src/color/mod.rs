use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{PiLitesError, Result};

/// One linear RGB pixel. Serialised as a `#rrggbb` string, which round-trips
/// losslessly to the triple the hardware sink consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Scales every channel by `factor`, clamped to [0, 1]. Truncates toward
    /// zero, so `255 * 0.5` becomes 127.
    pub fn scale(self, factor: f64) -> Self {
        let f = clamp_unit(factor);
        Self::new(
            channel(f64::from(self.r) * f),
            channel(f64::from(self.g) * f),
            channel(f64::from(self.b) * f),
        )
    }

    /// Linear interpolation from `self` (t = 0) to `other` (t = 1).
    pub fn lerp(self, other: Rgb, t: f64) -> Self {
        let t = clamp_unit(t);
        let mix = |a: u8, b: u8| {
            let a = f64::from(a);
            channel(a + (f64::from(b) - a) * t)
        };
        Self::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = PiLitesError;

    fn from_str(s: &str) -> Result<Self> {
        hex_to_rgb(s)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex_to_rgb(&text).map_err(de::Error::custom)
    }
}

/// Parses `#rrggbb` (the leading `#` is optional).
pub fn hex_to_rgb(hex: &str) -> Result<Rgb> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PiLitesError::config(format!("invalid hex color `{hex}`")));
    }
    let component = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| PiLitesError::config(format!("invalid hex color `{hex}`")))
    };
    Ok(Rgb::new(component(0..2)?, component(2..4)?, component(4..6)?))
}

pub fn rgb_to_hex(color: Rgb) -> String {
    color.to_hex()
}

/// HSV to RGB with every component in [0, 1]. Hue wraps.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> Rgb {
    let s = clamp_unit(saturation);
    let v = clamp_unit(value);
    let h = hue.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u8 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb::new(channel(r * 255.0), channel(g * 255.0), channel(b * 255.0))
}

/// Clamps a blend factor to [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn channel(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_hex() {
        let color = hex_to_rgb("#ff8000").unwrap();
        assert_eq!(color, Rgb::new(255, 128, 0));
        assert_eq!(color.to_hex(), "#ff8000");
        assert_eq!(hex_to_rgb("00ff00").unwrap(), Rgb::new(0, 255, 0));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(hex_to_rgb("#fff").is_err());
        assert!(hex_to_rgb("#gg0000").is_err());
        assert!(hex_to_rgb("#ff00ff00").is_err());
    }

    #[test]
    fn scale_truncates_and_clamps() {
        let red = Rgb::new(255, 0, 0);
        assert_eq!(red.scale(0.5), Rgb::new(127, 0, 0));
        assert_eq!(red.scale(3.0), red);
        assert_eq!(red.scale(-1.0), Rgb::BLACK);
    }

    #[test]
    fn lerp_hits_endpoints() {
        let a = Rgb::new(10, 20, 30);
        let b = Rgb::new(110, 220, 30);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Rgb::new(60, 120, 30));
        assert_eq!(a.lerp(b, 7.0), b);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0).g, 255);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0).b, 255);
        assert_eq!(hsv_to_rgb(1.0, 1.0, 1.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&vec![Rgb::WHITE, Rgb::BLACK]).unwrap();
        assert_eq!(json, r##"["#ffffff","#000000"]"##);
        let back: Vec<Rgb> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Rgb::WHITE, Rgb::BLACK]);
    }
}
