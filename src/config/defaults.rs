//! Default configuration values
//!
//! Named constants for all tunable parameters

/// Default grid resolution in cells per degree (about 110 m cells)
pub const DEFAULT_PRECISION: f64 = 1000.0;

/// Default half-width of the neighborhood search box, in degrees
pub const DEFAULT_HALF_WIDTH: f64 = 0.005;

/// Default Gaussian kernel bandwidth, in degrees
pub const DEFAULT_SIGMA: f64 = 0.002;

/// Default seconds between snapshots while serving (0 disables)
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 60;

/// Default output format
pub const DEFAULT_FORMAT: &str = "text";

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 9999;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name (for XDG paths)
pub const APP_DIR_NAME: &str = "crowdmap";
