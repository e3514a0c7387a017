use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hps3d_service::{HpsService, PointsFile, ServiceConfig};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Parser, Debug)]
#[command(name = "hps3d-service")]
#[command(about = "Samples an HPS3D-160 depth sensor at fixed points and publishes the distances")]
#[command(version)]
#[command(long_about = "Connects to an HPS3D-160 time-of-flight sensor, averages a small pixel \
window around each configured sample point, and publishes the results as JSON over MQTT and \
stdout. Measurement is switched on and off over MQTT or a small HTTP control interface.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hps3d.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Points file, overrides `sampling.points_file`
    #[arg(short, long, help = "Path to the sample points file")]
    points: Option<String>,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, help = "Log output format")]
    log_format: LogFormat,

    #[arg(long, help = "Validate configuration and points file, then exit")]
    validate_config: bool,

    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(long, help = "Load everything and report the setup without starting the service")]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let mut config = ServiceConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(points) = &args.points {
        config.sampling.points_file = points.clone();
    }

    // Points-file warnings go to the console before the full subscriber exists
    let points = tracing::subscriber::with_default(bootstrap_subscriber(&args), || {
        PointsFile::load(&config.sampling.points_file, config.sampling.window_size)
    })
    .with_context(|| format!("Failed to read points file {}", config.sampling.points_file))?;
    points.apply_overrides(&mut config);

    let log_guard = init_logging(&args, &config)?;

    info!("Starting HPS3D service v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!(
            "✓ Configuration is valid ({} sample points)",
            points.points.len()
        );
        return Ok(());
    }

    if args.dry_run {
        print_setup(&config, &points);
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    let runtime = build_runtime(config.system.use_threading)?;
    let exit_code = runtime.block_on(async {
        let mut service = HpsService::new(config, points.points);
        service.run().await.map_err(|e| {
            error!("Service error: {}", e);
            e
        })
    })?;

    info!("HPS3D service exited with code: {}", exit_code);
    // Drop the runtime first so the log guard flushes everything
    drop(runtime);
    drop(log_guard);
    std::process::exit(exit_code);
}

fn build_runtime(use_threading: bool) -> Result<tokio::runtime::Runtime> {
    let mut builder = if use_threading {
        tokio::runtime::Builder::new_multi_thread()
    } else {
        tokio::runtime::Builder::new_current_thread()
    };
    builder
        .enable_all()
        .thread_name("hps3d-worker")
        .build()
        .context("Failed to build async runtime")
}

fn log_level(args: &Args) -> &'static str {
    if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    }
}

fn env_filter(args: &Args) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("hps3d_service={}", log_level(args)))
    })
}

fn bootstrap_subscriber(args: &Args) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(args))
        .finish()
}

fn init_logging(args: &Args, config: &ServiceConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let verbose_source = args.debug || config.logging.debug;
    let console = match args.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(verbose_source)
            .with_file(verbose_source)
            .with_line_number(verbose_source)
            .boxed(),
    };

    let mut file_error = None;
    let (debug_file, guard) = match (config.logging.debug, &config.logging.debug_file) {
        (true, Some(path)) => {
            match debug_file_appender(Path::new(path)) {
                Ok(appender) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(tracing_subscriber::EnvFilter::new("hps3d_service=debug"))
                        .boxed();
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    file_error = Some(e);
                    (None, None)
                }
            }
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(console.with_filter(env_filter(args)))
        .with(debug_file)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some(e) = file_error {
        warn!("Continuing without debug log file: {:#}", e);
    }
    Ok(guard)
}

/// Open the debug log file, creating its directory if needed
fn debug_file_appender(path: &Path) -> Result<RollingFileAppender> {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Debug log path has no file name: {}", path.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(directory)
        .with_context(|| format!("Cannot open debug log {}", path.display()))
}

fn print_setup(config: &ServiceConfig, points: &PointsFile) {
    println!("Sensor port:     {}", config.sensor.port);
    println!(
        "Measure every:   {} ms (output every {} ms)",
        config.acquisition.measure_interval_ms, config.output.interval_ms
    );
    println!(
        "Window:          {}x{} (min {} valid pixels)",
        config.sampling.window_size, config.sampling.window_size, config.sampling.min_valid_pixels
    );
    println!(
        "MQTT:            {}",
        if config.mqtt.enabled {
            format!("{}:{}", config.mqtt.host, config.mqtt.port)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "HTTP control:    {}",
        if config.http.enabled {
            format!("{}:{}", config.http.ip, config.http.port)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "Runtime:         {}",
        if config.system.use_threading {
            "multi-thread"
        } else {
            "single thread"
        }
    );
    println!("Sample points:");
    for point in &points.points {
        println!("  {:<16} ({}, {})", point.name, point.x, point.y);
    }
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# HPS3D service configuration");
    println!("# Every key is optional; HPS3D_<SECTION>__<KEY> environment variables override");
    println!();
    let rendered = toml::to_string_pretty(&ServiceConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_file_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("hps3d-debug.log");

        assert!(debug_file_appender(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_debug_file_is_an_error() {
        let path = Path::new("/proc/hps3d-service/debug.log");
        assert!(debug_file_appender(path).is_err());

        assert!(debug_file_appender(Path::new("/")).is_err());
    }
}
