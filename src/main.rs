use clap::Parser;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use uwb_positioning::{PositioningSession, TrackingConfig};

/// Console UWB tracker: prints the smoothed tag position
#[derive(Parser, Debug)]
#[command(name = "uwb-track", version, about, long_about = None)]
struct Args {
    /// Tracking configuration (JSON)
    #[arg(long, short, value_name = "FILE")]
    config: PathBuf,

    /// Override the serial port from the configuration
    #[arg(long, value_name = "PORT")]
    port: Option<String>,

    /// Override the baud rate from the configuration
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Stop after this many seconds (runs until killed if omitted)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Print positions as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// Level used when `RUST_LOG` is unset
fn default_log_filter(debug_logging: bool) -> &'static str {
    if debug_logging {
        "debug"
    } else {
        "info"
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // The configuration picks the log level, so it is read before the
    // logger exists and reports its own errors on stderr.
    let mut config = match TrackingConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.serial.baud_rate = baud_rate;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(config.debug_logging)),
    )
    .init();
    log::info!("loaded configuration from {}", args.config.display());

    let mut session = match PositioningSession::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = session.start() {
        log::error!("could not connect to UWB device: {e}");
        return ExitCode::FAILURE;
    }

    let deadline = args.duration_secs.map(|s| Instant::now() + Duration::from_secs(s));
    let interval = session.poll_interval();
    let mut last_rate_report = Instant::now();
    let mut updates = 0u32;

    session.poll_every(interval, |position| {
        if let Some(p) = position {
            updates += 1;
            if args.json {
                match serde_json::to_string(&p) {
                    Ok(line) => println!("{line}"),
                    Err(e) => log::warn!("could not encode position: {e}"),
                }
            } else {
                println!("x={:.1} y={:.1}", p.x, p.y);
            }
        }

        let elapsed = last_rate_report.elapsed();
        if elapsed >= Duration::from_secs(5) {
            log::info!("{:.1} updates/s", f64::from(updates) / elapsed.as_secs_f64());
            updates = 0;
            last_rate_report = Instant::now();
        }

        match deadline {
            Some(deadline) if Instant::now() >= deadline => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    });

    session.stop();
    let stats = session.statistics();
    log::info!(
        "{} positions from {} samples ({} discarded, {} dropped unread, {} read errors)",
        stats.positions_produced,
        stats.samples_received,
        stats.discarded_samples(),
        stats.reader.samples_dropped,
        stats.reader.read_errors
    );
    ExitCode::SUCCESS
}
