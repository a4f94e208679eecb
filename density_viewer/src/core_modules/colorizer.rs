// THEORY:
// The `colorizer` turns one scalar per Gaussian component (its log-density) into one
// color per point. It never looks at geometry.
//
// 1.  **Range Normalization**: Raw log-densities are rescaled to [0, 1] using the
//     observed min/max across components. The raw bounds travel with the result so the
//     client can label its legend in raw units.
// 2.  **Palette, Then Indirection**: Each component is colored exactly once. Points never
//     get their own evaluation; they borrow the color of the component their label
//     points at, so two points with the same label are guaranteed the same triple.
// 3.  **Legend Gradient**: Independently of the data, the colormap is sampled at 101
//     uniform steps and converted to bytes by truncation. That is what existing clients
//     render and what they compare against.

use crate::core_modules::colormap::{to_byte_range, Colormap, Rgb, RgbBytes};
use crate::error::{Result, ServiceError};

/// Number of intervals in the legend; the gradient holds `GRADIENT_STEPS + 1` samples.
pub const GRADIENT_STEPS: usize = 100;

/// Normalized value assigned to every component when all densities are equal.
pub const FLAT_RANGE_VALUE: f64 = 0.5;

/// Observed bounds of the raw log-densities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityRange {
    pub min: f64,
    pub max: f64,
}

impl DensityRange {
    /// The range reported when there is nothing to measure.
    pub const EMPTY: DensityRange = DensityRange { min: 0.0, max: 1.0 };

    pub fn observe(values: &[f64]) -> Result<Self> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ServiceError::malformed(format!(
                "log-density of component {index} is not finite"
            )));
        }
        if values.is_empty() {
            return Ok(Self::EMPTY);
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self { min, max })
    }

    pub fn is_flat(&self) -> bool {
        self.max <= self.min
    }

    /// Maps `value` into [0, 1]. A flat range maps everything to the midpoint.
    ///
    /// Both differences are taken on halved operands so a span wider than `f64::MAX`
    /// still normalizes to finite values.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_flat() {
            FLAT_RANGE_VALUE
        } else {
            (value / 2.0 - self.min / 2.0) / (self.max / 2.0 - self.min / 2.0)
        }
    }
}

/// Everything the colorizer produces for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityColoring {
    /// One color per point, parallel to the labels.
    pub colors: Vec<Rgb>,
    /// Legend samples of the colormap at `k / 100`.
    pub gradient: Vec<RgbBytes>,
    /// Per-component normalized density.
    pub normalized: Vec<f64>,
    pub range: DensityRange,
}

impl DensityColoring {
    pub fn min_density(&self) -> f64 {
        self.range.min
    }

    pub fn max_density(&self) -> f64 {
        self.range.max
    }
}

/// Normalizes every component's log-density into [0, 1].
pub fn normalize_densities(log_densities: &[f64]) -> Result<(Vec<f64>, DensityRange)> {
    let range = DensityRange::observe(log_densities)?;
    if range.is_flat() && log_densities.len() > 1 {
        tracing::debug!(
            components = log_densities.len(),
            value = range.min,
            "all components share one density"
        );
    }
    let normalized = log_densities.iter().map(|&d| range.normalize(d)).collect();
    Ok((normalized, range))
}

/// Samples `colormap` at `GRADIENT_STEPS + 1` uniform positions, as bytes.
pub fn gradient(colormap: &Colormap) -> Vec<RgbBytes> {
    (0..=GRADIENT_STEPS)
        .map(|k| to_byte_range(colormap.sample(k as f64 / GRADIENT_STEPS as f64)))
        .collect()
}

/// Colors points by the normalized log-density of the component each is labeled with.
pub fn colorize(
    log_densities: &[f64],
    labels: &[usize],
    colormap: &Colormap,
) -> Result<DensityColoring> {
    if let Some((point, &label)) = labels
        .iter()
        .enumerate()
        .find(|&(_, &label)| label >= log_densities.len())
    {
        return Err(ServiceError::malformed(format!(
            "label {label} of point {point} is out of range for {} components",
            log_densities.len()
        )));
    }

    let (normalized, range) = normalize_densities(log_densities)?;
    let palette: Vec<Rgb> = normalized.iter().map(|&t| colormap.sample(t)).collect();
    let colors = labels.iter().map(|&label| palette[label]).collect();

    Ok(DensityColoring {
        colors,
        gradient: gradient(colormap),
        normalized,
        range,
    })
}
