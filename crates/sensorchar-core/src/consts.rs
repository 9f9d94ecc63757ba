/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Default symmetric clip threshold (in standard deviations) for master frames.
pub const DEFAULT_STACK_SIGMA: f64 = 3.0;

/// Default clip threshold applied to a read-noise field before summarizing it.
pub const DEFAULT_NOISE_CLIP_SIGMA: f64 = 10.0;

/// Safety bound on "iterate until convergence" sigma clipping.
pub const MAX_CLIP_ITERATIONS: usize = 100;

/// Mean ADU above which a point is treated as saturated and left out of fits.
pub const DEFAULT_SATURATION_ADU: f64 = 4050.0;

/// Default edge length of the centered PTC region of interest.
pub const DEFAULT_PTC_ROI_SIZE: usize = 300;

/// Default tile edge for the spatial gain map.
pub const DEFAULT_GAIN_MAP_BLOCK: usize = 48;

/// Default threshold (in frame standard deviations) for telegraph-noise pixels.
pub const DEFAULT_TELEGRAPH_SIGMA: f64 = 12.0;

/// Default edge of the window traced around a telegraph-noise pixel.
pub const DEFAULT_TELEGRAPH_WINDOW: usize = 50;

/// Two-sided 95% confidence z-score.
pub const DEFAULT_Z_SCORE: f64 = 1.96;

/// Decoded stack size (in bytes) above which master frames are built in row bands.
/// Default: 1 GiB.
pub const LOW_MEMORY_THRESHOLD_BYTES: usize = 1_073_741_824;

/// Rows per band for windowed master-frame reduction.
pub const DEFAULT_BLOCK_ROWS: usize = 64;

/// FITS logical record length in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card length in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Planck constant (J s).
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;
