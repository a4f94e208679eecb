// THEORY:
// A `Colormap` is a continuous function from [0, 1] to an RGB triple with channels
// in [0, 1]. The colorizer uses it twice: once to paint each Gaussian component by
// its normalized density and once to sample the legend gradient shown next to the
// cloud. Both must come from the same function or the legend lies.
//
// Maps are resolved by name through a `ColormapRegistry` built once at startup and
// shared read-only between requests. Most maps are tables of evenly spaced stops with
// linear interpolation in between; `jet` is closed-form.

use std::collections::BTreeMap;

use crate::error::{Result, ServiceError};

pub type Channel = f64;
pub type Rgb = [Channel; 3];
pub type RgbBytes = [u8; 3];

pub const DEFAULT_COLORMAP: &str = "coolwarm";

// Moreland's diverging cool-to-warm table, 33 evenly spaced stops.
const COOLWARM_STOPS: [RgbBytes; 33] = [
    [59, 76, 192],
    [68, 90, 204],
    [77, 104, 215],
    [87, 117, 225],
    [98, 130, 234],
    [108, 142, 241],
    [119, 154, 247],
    [130, 165, 251],
    [141, 176, 254],
    [152, 185, 255],
    [163, 194, 255],
    [174, 201, 253],
    [184, 208, 249],
    [194, 213, 244],
    [204, 217, 238],
    [213, 219, 230],
    [221, 221, 221],
    [229, 216, 209],
    [236, 211, 197],
    [241, 204, 185],
    [245, 196, 173],
    [247, 187, 160],
    [247, 177, 148],
    [247, 166, 135],
    [244, 154, 123],
    [241, 141, 111],
    [236, 127, 99],
    [229, 112, 88],
    [222, 96, 77],
    [213, 80, 66],
    [203, 62, 56],
    [192, 40, 47],
    [180, 4, 38],
];

const VIRIDIS_STOPS: [Rgb; 9] = [
    [0.267004, 0.004874, 0.329415],
    [0.282623, 0.140926, 0.457517],
    [0.229739, 0.322361, 0.545706],
    [0.172719, 0.448791, 0.557885],
    [0.127568, 0.566949, 0.550556],
    [0.134692, 0.658636, 0.517649],
    [0.266941, 0.748751, 0.440573],
    [0.477504, 0.821444, 0.318195],
    [0.993248, 0.906157, 0.143936],
];

#[derive(Debug, Clone, PartialEq)]
enum Curve {
    /// Evenly spaced stops, `t = 0` is the first one and `t = 1` the last.
    Stops(Vec<Rgb>),
    Jet,
}

/// A named continuous colormap over [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: String,
    curve: Curve,
}

impl Colormap {
    /// Builds a map from at least two evenly spaced stops.
    pub fn from_stops(name: impl Into<String>, stops: Vec<Rgb>) -> Result<Self> {
        let name = name.into();
        if stops.len() < 2 {
            return Err(ServiceError::malformed(format!(
                "colormap '{name}' needs at least two stops, got {}",
                stops.len()
            )));
        }
        Ok(Self {
            name,
            curve: Curve::Stops(stops),
        })
    }

    pub fn coolwarm() -> Self {
        Self {
            name: "coolwarm".into(),
            curve: Curve::Stops(COOLWARM_STOPS.iter().map(normalize_bytes).collect()),
        }
    }

    pub fn viridis() -> Self {
        Self {
            name: "viridis".into(),
            curve: Curve::Stops(VIRIDIS_STOPS.to_vec()),
        }
    }

    pub fn jet() -> Self {
        Self {
            name: "jet".into(),
            curve: Curve::Jet,
        }
    }

    pub fn gray() -> Self {
        Self {
            name: "gray".into(),
            curve: Curve::Stops(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the map at `t`. Values outside [0, 1] are clamped.
    pub fn sample(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match &self.curve {
            Curve::Stops(stops) => interpolate(stops, t),
            Curve::Jet => [
                (1.5 - 4.0 * (t - 0.75).abs()).clamp(0.0, 1.0),
                (1.5 - 4.0 * (t - 0.5).abs()).clamp(0.0, 1.0),
                (1.5 - 4.0 * (t - 0.25).abs()).clamp(0.0, 1.0),
            ],
        }
    }
}

fn interpolate(stops: &[Rgb], t: f64) -> Rgb {
    let n = stops.len() - 1;
    let scaled = t * n as f64;
    let idx = (scaled as usize).min(n - 1);
    let frac = scaled - idx as f64;

    let a = &stops[idx];
    let b = &stops[idx + 1];
    [
        a[0] * (1.0 - frac) + b[0] * frac,
        a[1] * (1.0 - frac) + b[1] * frac,
        a[2] * (1.0 - frac) + b[2] * frac,
    ]
}

fn normalize_bytes(bytes: &RgbBytes) -> Rgb {
    bytes.map(|b| b as f64 / 255.0)
}

/// Converts [0, 1] channels to bytes by truncation, never rounding.
pub fn to_byte_range(color: Rgb) -> RgbBytes {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8)
}

/// Name → colormap lookup, built once per process.
#[derive(Debug, Clone)]
pub struct ColormapRegistry {
    maps: BTreeMap<String, Colormap>,
    default_name: String,
}

impl ColormapRegistry {
    /// An empty registry whose default is `default_name`.
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            maps: BTreeMap::new(),
            default_name: default_name.into().to_ascii_lowercase(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new(DEFAULT_COLORMAP);
        for map in [
            Colormap::coolwarm(),
            Colormap::viridis(),
            Colormap::jet(),
            Colormap::gray(),
        ] {
            registry.register(map);
        }
        registry
    }

    /// Adds or replaces a map under its lowercased name.
    pub fn register(&mut self, map: Colormap) {
        self.maps.insert(map.name.to_ascii_lowercase(), map);
    }

    /// Changes the default, failing if `name` is not registered.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        let key = name.trim().to_ascii_lowercase();
        self.get(&key)?;
        self.default_name = key;
        Ok(())
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Sorted registered names.
    pub fn names(&self) -> Vec<&str> {
        self.maps.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<&Colormap> {
        self.maps
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| ServiceError::UnknownColormap {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Looks up `name`, or the default when `name` is absent or blank.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Colormap> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => self.get(n),
            None => self.get(&self.default_name),
        }
    }
}

impl Default for ColormapRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
