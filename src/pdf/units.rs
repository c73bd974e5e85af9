//! Unit conversions between points, pixels, twips and hundredths of a
//! millimetre, plus the process-wide default rendering resolution.

use std::sync::OnceLock;

/// Environment variable overriding the default rendering resolution.
pub const RESOLUTION_ENV_VAR: &str = "PDFIMPORT_RESOLUTION_DPI";

/// Resolution used when neither the caller nor the environment sets one.
pub const DEFAULT_RESOLUTION_DPI: f64 = 96.0;

/// Points per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Twips per point.
pub const TWIPS_PER_POINT: f64 = 20.0;

/// Hundredths of a millimetre per inch.
pub const MM100_PER_INCH: f64 = 2540.0;

/// Convert points to (fractional) pixels at `dpi`.
pub fn point_to_pixel(points: f64, dpi: f64) -> f64 {
    points * dpi / POINTS_PER_INCH
}

/// Convert points to a whole pixel count at `dpi`.
pub fn point_to_pixel_count(points: f64, dpi: f64) -> usize {
    let pixels = point_to_pixel(points, dpi).round();
    if pixels.is_finite() && pixels > 0.0 {
        pixels as usize
    } else {
        0
    }
}

/// Convert points to hundredths of a millimetre.
pub fn point_to_mm100(points: f64) -> f64 {
    points * MM100_PER_INCH / POINTS_PER_INCH
}

/// Convert hundredths of a millimetre to whole twips.
pub fn mm100_to_twip(mm100: f64) -> i64 {
    (mm100 * POINTS_PER_INCH * TWIPS_PER_POINT / MM100_PER_INCH).round() as i64
}

/// Convert hundredths of a millimetre to points, through the twip grid.
pub fn mm100_to_point(mm100: f64) -> f64 {
    mm100_to_twip(mm100) as f64 / TWIPS_PER_POINT
}

/// Convert pixels at `dpi` to hundredths of a millimetre.
pub fn pixel_to_mm100(pixels: f64, dpi: f64) -> f64 {
    pixels * MM100_PER_INCH / dpi
}

/// Parse a resolution override from its longest numeric prefix, so `150dpi`
/// reads as 150. Only finite positive values count.
fn parse_resolution(value: &str) -> Option<f64> {
    let value = value.trim_start();
    value
        .char_indices()
        .map(|(index, c)| index + c.len_utf8())
        .rev()
        .find_map(|end| value[..end].parse::<f64>().ok())
        .filter(|dpi| dpi.is_finite() && *dpi > 0.0)
}

/// Pick a resolution: explicit value, then environment value, then 96.
pub fn resolution_from(explicit: Option<f64>, env_value: Option<&str>) -> f64 {
    explicit
        .filter(|dpi| dpi.is_finite() && *dpi > 0.0)
        .or_else(|| env_value.and_then(parse_resolution))
        .unwrap_or(DEFAULT_RESOLUTION_DPI)
}

/// Process-wide default resolution. The environment is read once, on first use.
pub fn default_resolution_dpi() -> f64 {
    static DEFAULT: OnceLock<f64> = OnceLock::new();
    *DEFAULT.get_or_init(|| {
        let env_value = std::env::var(RESOLUTION_ENV_VAR).ok();
        let dpi = resolution_from(None, env_value.as_deref());
        tracing::debug!(dpi, "default PDF rendering resolution");
        dpi
    })
}

/// Effective resolution for a call: `explicit` if set, else the process default.
pub fn effective_resolution(explicit: Option<f64>) -> f64 {
    match explicit.filter(|dpi| dpi.is_finite() && *dpi > 0.0) {
        Some(dpi) => dpi,
        None => default_resolution_dpi(),
    }
}
