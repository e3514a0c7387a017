use crate::sampler::{DEFAULT_MIN_VALID_PIXELS, DEFAULT_WINDOW_SIZE};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// USB device path, or `tcp://ip:port` for an Ethernet sensor
    #[serde(default = "default_sensor_port")]
    pub port: String,

    /// Upper bound for a single capture
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Pause between closing and reopening an already open link
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Device-side filter settings, passed through unchanged
    #[serde(default)]
    pub filters: FilterSettings,

    /// Parameters for the simulated device backend
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmoothFilter {
    Disabled,
    Average,
    Gauss,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterSettings {
    #[serde(default)]
    pub distance_filter_enabled: bool,

    #[serde(default = "default_distance_filter_k")]
    pub distance_filter_k: f32,

    #[serde(default = "default_smooth_filter")]
    pub smooth_filter: SmoothFilter,

    #[serde(default)]
    pub smooth_filter_args: u32,

    #[serde(default)]
    pub edge_filter_enabled: bool,

    #[serde(default = "default_optical_path_calibration")]
    pub optical_path_calibration: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulationConfig {
    /// Distance at the frame center in millimeters
    #[serde(default = "default_sim_base_distance")]
    pub base_distance_mm: u16,

    /// Distance added per pixel column, producing a tilted plane
    #[serde(default = "default_sim_tilt")]
    pub tilt_mm_per_column: u16,

    /// Every n-th pixel reports low amplitude (0 disables)
    #[serde(default = "default_sim_speckle_every")]
    pub speckle_every: u32,

    /// Every n-th capture fails with a read error (0 disables)
    #[serde(default)]
    pub fail_every: u32,

    /// Simulated device capture latency
    #[serde(default = "default_sim_capture_latency_ms")]
    pub capture_latency_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SamplingConfig {
    /// Points file in key=value / `x,y,name` format
    #[serde(default = "default_points_file")]
    pub points_file: String,

    /// Odd side length of the sampling window
    #[serde(default = "default_window_size")]
    pub window_size: u32,

    /// Valid pixels required for a measurement to count
    #[serde(default = "default_min_valid_pixels")]
    pub min_valid_pixels: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Pause after a successful measurement cycle
    #[serde(default = "default_measure_interval_ms")]
    pub measure_interval_ms: u64,

    /// Sleep while inactive, before the idle slow-down kicks in
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Idle cycles before the sleep grows to `idle_slow_interval_ms`
    #[serde(default = "default_idle_slow_after_cycles")]
    pub idle_slow_after_cycles: u32,

    #[serde(default = "default_idle_slow_interval_ms")]
    pub idle_slow_interval_ms: u64,

    /// Idle cycles before the sleep grows to `idle_deep_interval_ms`
    #[serde(default = "default_idle_deep_after_cycles")]
    pub idle_deep_after_cycles: u32,

    #[serde(default = "default_idle_deep_interval_ms")]
    pub idle_deep_interval_ms: u64,

    /// Consecutive capture failures before the link is torn down
    #[serde(default = "default_capture_retry_limit")]
    pub capture_retry_limit: u32,

    #[serde(default = "default_capture_retry_delay_ms")]
    pub capture_retry_delay_ms: u64,

    /// Wait after a failed reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Double the reconnect delay per consecutive failed attempt
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Successful cycles between link health checks (0 disables)
    #[serde(default = "default_health_check_cycles")]
    pub health_check_cycles: u32,

    /// Start measuring without waiting for a start command
    #[serde(default)]
    pub start_active: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Publish interval for measurement JSON
    #[serde(default = "default_output_interval_ms")]
    pub interval_ms: u64,

    /// Write measurement JSON lines to stdout
    #[serde(default = "default_stdout_output")]
    pub stdout: bool,

    /// How long a point-cloud request waits for a fresh capture
    #[serde(default = "default_pointcloud_timeout_ms")]
    pub pointcloud_timeout_ms: u64,

    /// Cap on points in one point-cloud payload
    #[serde(default = "default_max_pointcloud_points")]
    pub max_pointcloud_points: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_enabled")]
    pub enabled: bool,

    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier, generated when absent
    pub client_id: Option<String>,

    #[serde(default = "default_measurement_topic")]
    pub measurement_topic: String,

    #[serde(default = "default_control_topic")]
    pub control_topic: String,

    #[serde(default = "default_pointcloud_topic")]
    pub pointcloud_topic: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Wait between broker reconnect attempts
    #[serde(default = "default_mqtt_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_http_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Write a debug log file in addition to console output
    #[serde(default)]
    pub debug: bool,

    pub debug_file: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Run loops on a multi-thread runtime instead of interleaving them on one thread
    #[serde(default = "default_use_threading")]
    pub use_threading: bool,

    /// Bound on waiting for loops to exit during shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl ServiceConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("hps3d.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // HPS3D_HTTP__PORT=9090 overrides http.port
            .add_source(
                Environment::with_prefix("HPS3D")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServiceConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = self.sampling.window_size;
        if window == 0 || window % 2 == 0 {
            return Err(ConfigError::Message(format!(
                "Sampling window size must be odd and greater than 0 (got {})",
                window
            )));
        }

        let area = window * window;
        if self.sampling.min_valid_pixels == 0 || self.sampling.min_valid_pixels > area {
            return Err(ConfigError::Message(format!(
                "min_valid_pixels must be between 1 and {} (got {})",
                area, self.sampling.min_valid_pixels
            )));
        }

        if self.acquisition.measure_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Measure interval must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.idle_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Idle interval must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.capture_retry_limit == 0 {
            return Err(ConfigError::Message(
                "Capture retry limit must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.reconnect_delay_ms > self.acquisition.reconnect_max_delay_ms {
            return Err(ConfigError::Message(
                "reconnect_delay_ms must not exceed reconnect_max_delay_ms".to_string(),
            ));
        }

        if self.output.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Output interval must be greater than 0".to_string(),
            ));
        }

        if self.sensor.capture_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }

        if self.mqtt.enabled && self.mqtt.control_topic == self.mqtt.measurement_topic {
            return Err(ConfigError::Message(
                "MQTT control and measurement topics must differ".to_string(),
            ));
        }

        Ok(())
    }
}

impl SensorConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl AcquisitionConfig {
    pub fn measure_interval(&self) -> Duration {
        Duration::from_millis(self.measure_interval_ms)
    }

    /// Sleep for the given number of consecutive idle cycles
    pub fn idle_interval(&self, idle_cycles: u32) -> Duration {
        let ms = if idle_cycles < self.idle_slow_after_cycles {
            self.idle_interval_ms
        } else if idle_cycles < self.idle_deep_after_cycles {
            self.idle_slow_interval_ms
        } else {
            self.idle_deep_interval_ms
        };
        Duration::from_millis(ms)
    }

    pub fn capture_retry_delay(&self) -> Duration {
        Duration::from_millis(self.capture_retry_delay_ms)
    }
}

impl OutputConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn pointcloud_timeout(&self) -> Duration {
        Duration::from_millis(self.pointcloud_timeout_ms)
    }
}

impl MqttConfig {
    /// Topic receiving the connect announcement
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.measurement_topic)
    }
}

impl SystemConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: default_sensor_port(),
            capture_timeout_ms: default_capture_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            filters: FilterSettings::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            distance_filter_enabled: false,
            distance_filter_k: default_distance_filter_k(),
            smooth_filter: default_smooth_filter(),
            smooth_filter_args: 0,
            edge_filter_enabled: false,
            optical_path_calibration: default_optical_path_calibration(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_distance_mm: default_sim_base_distance(),
            tilt_mm_per_column: default_sim_tilt(),
            speckle_every: default_sim_speckle_every(),
            fail_every: 0,
            capture_latency_ms: default_sim_capture_latency_ms(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            points_file: default_points_file(),
            window_size: default_window_size(),
            min_valid_pixels: default_min_valid_pixels(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            measure_interval_ms: default_measure_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            idle_slow_after_cycles: default_idle_slow_after_cycles(),
            idle_slow_interval_ms: default_idle_slow_interval_ms(),
            idle_deep_after_cycles: default_idle_deep_after_cycles(),
            idle_deep_interval_ms: default_idle_deep_interval_ms(),
            capture_retry_limit: default_capture_retry_limit(),
            capture_retry_delay_ms: default_capture_retry_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            exponential_backoff: false,
            health_check_cycles: default_health_check_cycles(),
            start_active: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_output_interval_ms(),
            stdout: default_stdout_output(),
            pointcloud_timeout_ms: default_pointcloud_timeout_ms(),
            max_pointcloud_points: default_max_pointcloud_points(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_enabled(),
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
            measurement_topic: default_measurement_topic(),
            control_topic: default_control_topic(),
            pointcloud_topic: default_pointcloud_topic(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_mqtt_reconnect_delay_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            ip: default_http_ip(),
            port: default_http_port(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            use_threading: default_use_threading(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

// Default value functions
fn default_sensor_port() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_capture_timeout_ms() -> u64 {
    2000
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_distance_filter_k() -> f32 {
    0.1
}
fn default_smooth_filter() -> SmoothFilter {
    SmoothFilter::Disabled
}
fn default_optical_path_calibration() -> bool {
    true
}

fn default_sim_base_distance() -> u16 {
    1500
}
fn default_sim_tilt() -> u16 {
    2
}
fn default_sim_speckle_every() -> u32 {
    37
}
fn default_sim_capture_latency_ms() -> u64 {
    30
}

fn default_points_file() -> String {
    "/etc/hps3d/points.conf".to_string()
}
fn default_window_size() -> u32 {
    DEFAULT_WINDOW_SIZE
}
fn default_min_valid_pixels() -> u32 {
    DEFAULT_MIN_VALID_PIXELS
}

fn default_measure_interval_ms() -> u64 {
    1500
}
fn default_idle_interval_ms() -> u64 {
    100
}
fn default_idle_slow_after_cycles() -> u32 {
    50
}
fn default_idle_slow_interval_ms() -> u64 {
    500
}
fn default_idle_deep_after_cycles() -> u32 {
    300
}
fn default_idle_deep_interval_ms() -> u64 {
    1000
}
fn default_capture_retry_limit() -> u32 {
    3
}
fn default_capture_retry_delay_ms() -> u64 {
    100
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_reconnect_max_delay_ms() -> u64 {
    16000
}
fn default_health_check_cycles() -> u32 {
    50
}

fn default_output_interval_ms() -> u64 {
    2000
}
fn default_stdout_output() -> bool {
    true
}
fn default_pointcloud_timeout_ms() -> u64 {
    3000
}
fn default_max_pointcloud_points() -> usize {
    9600
}

fn default_mqtt_enabled() -> bool {
    true
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_measurement_topic() -> String {
    "hps3d/measurements".to_string()
}
fn default_control_topic() -> String {
    "hps3d/control".to_string()
}
fn default_pointcloud_topic() -> String {
    "hps3d/pointcloud".to_string()
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_mqtt_reconnect_delay_secs() -> u64 {
    5
}

fn default_http_enabled() -> bool {
    true
}
fn default_http_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}

fn default_use_threading() -> bool {
    true
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
