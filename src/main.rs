mod app;
mod client;
mod config;
mod error;
mod notify;
mod pipeline;
mod render;
mod session;
mod shell;
#[cfg(test)]
mod testing;
mod types;
mod upload;

use std::{
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    app::App,
    client::{DetectionService, HttpDetectionService},
    config::{AnalyzeEndpoint, CameraBackend, Settings},
    pipeline::{CameraSource, LocalCamera, RemoteCamera, available_cameras},
    types::Mode,
};

/// Client for a remote face-mask detection server.
#[derive(Parser)]
#[command(name = "mask-watch", version)]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Detection server base URL.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Endpoint used to analyse still images.
    #[arg(long, global = true, value_enum)]
    endpoint: Option<AnalyzeEndpoint>,

    /// Camera to stream from.
    #[arg(long, global = true, value_enum)]
    backend: Option<CameraBackend>,

    /// Index of the local camera.
    #[arg(long, global = true)]
    camera_index: Option<u32>,

    /// Milliseconds between real-time frame submissions.
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether the server's model and camera are ready.
    Status,
    /// Analyse one image and print the rendered results.
    Analyze {
        file: PathBuf,
        /// Write the HTML fragment here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Stream from a camera, optionally submitting frames for detection.
    Camera {
        /// Submit a frame every interval while streaming (overrides settings).
        #[arg(long, conflicts_with = "no_realtime")]
        realtime: bool,
        /// Only stream; never submit frames (overrides settings).
        #[arg(long)]
        no_realtime: bool,
        /// Stop after this many seconds (default: wait for Enter).
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// List cameras attached to this machine.
    Devices,
    /// Interactive shell driving both modes.
    Shell,
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;

    match cli.command {
        Command::Devices => list_devices(),
        Command::Status => print_status(&connect(&settings)?),
        Command::Analyze { file, out } => {
            let mut app = build_app(&settings)?;
            run_analyze(&mut app, &file, out)
        }
        Command::Camera {
            realtime,
            no_realtime,
            seconds,
        } => {
            apply_realtime_flags(&mut settings, realtime, no_realtime);
            let mut app = build_app(&settings)?;
            run_camera(&mut app, seconds.map(Duration::from_secs))
        }
        Command::Shell => {
            let mut app = build_app(&settings)?;
            let stdin = io::stdin();
            shell::run(&mut app, stdin.lock(), &mut io::stdout())
        }
    }
}

/// Bare `camera` keeps the configured realtime mode.
fn apply_realtime_flags(settings: &mut Settings, realtime: bool, no_realtime: bool) {
    if realtime {
        settings.realtime = true;
    } else if no_realtime {
        settings.realtime = false;
    }
}

fn connect(settings: &Settings) -> Result<HttpDetectionService> {
    HttpDetectionService::new(settings).context("failed to build HTTP client")
}

fn build_app(settings: &Settings) -> Result<App> {
    let service: Arc<dyn DetectionService> = Arc::new(connect(settings)?);
    let camera: Arc<dyn CameraSource> = match settings.camera_backend {
        CameraBackend::Local => Arc::new(LocalCamera::new(settings.camera_index)),
        CameraBackend::Remote => Arc::new(RemoteCamera::new(service.clone())),
    };
    Ok(App::new(settings, service, camera))
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }
    if let Some(endpoint) = cli.endpoint {
        settings.analyze_endpoint = endpoint;
    }
    if let Some(backend) = cli.backend {
        settings.camera_backend = backend;
    }
    if let Some(index) = cli.camera_index {
        settings.camera_index = index;
    }
    if let Some(interval) = cli.interval_ms {
        settings.frame_interval_ms = interval;
    }
    settings.validate()?;
    Ok(settings)
}

fn list_devices() -> Result<()> {
    let devices = available_cameras()?;
    if devices.is_empty() {
        println!("no cameras found");
    }
    for device in devices {
        println!("{}: {}", device.index, device.label);
    }
    Ok(())
}

fn print_status(service: &impl DetectionService) -> Result<()> {
    let model = service.model_status()?;
    let camera = service.camera_status()?;
    println!("model loaded:   {}", model.model_loaded);
    println!("cascade loaded: {}", model.cascade_loaded);
    let camera = if camera.available { "available" } else { "unavailable" };
    println!("server camera:  {camera}");
    if !model.is_ready() {
        println!("System initialization in progress...");
    }
    Ok(())
}

fn run_analyze(app: &mut App, file: &Path, out: Option<PathBuf>) -> Result<()> {
    app.check_system_status();
    app.switch_mode(Mode::Upload);
    if !app.select_file(file) {
        bail!(latest_message(app, "invalid image"));
    }

    let spinner = spinner(format!("analysing {}", file.display()));
    let analysed = app.analyze_image();
    spinner.finish_and_clear();
    if !analysed {
        bail!(latest_message(app, "analysis failed"));
    }

    let html = app.results().html().unwrap_or_default();
    match out {
        Some(path) => {
            fs::write(&path, html)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("results written to {}", path.display());
        }
        None => print!("{html}"),
    }
    Ok(())
}

fn run_camera(app: &mut App, duration: Option<Duration>) -> Result<()> {
    app.switch_mode(Mode::Camera);
    let spinner = spinner(format!("Starting camera... ({})", app.session().source_name()));
    let opened = app.start_camera();
    spinner.finish_and_clear();
    if !opened {
        bail!(latest_message(app, "camera failed to start"));
    }

    let session = app.session();
    println!(
        "{} at {}",
        session.status_text(),
        session.canvas().map(|c| c.to_string()).unwrap_or_default()
    );

    let stop = crossbeam_channel::bounded::<()>(1);
    match duration {
        Some(duration) => {
            let tx = stop.0.clone();
            thread::spawn(move || {
                thread::sleep(duration);
                let _ = tx.send(());
            });
        }
        None => {
            println!("press Enter to stop");
            let tx = stop.0.clone();
            thread::spawn(move || {
                let _ = io::stdin().lock().lines().next();
                let _ = tx.send(());
            });
        }
    }

    let started = Instant::now();
    let mut last_seq = None;
    loop {
        if stop.1.recv_timeout(Duration::from_millis(200)).is_ok() {
            break;
        }
        if app.poll_camera() {
            app.stop_camera();
            bail!(latest_message(app, "camera stream failed"));
        }
        if let Some(outcome) = app.session().latest_overlay() {
            if last_seq != Some(outcome.seq) {
                last_seq = Some(outcome.seq);
                println!(
                    "[{:>6.1}s] frame #{}\n{}",
                    started.elapsed().as_secs_f32(),
                    outcome.seq,
                    outcome.html
                );
            }
        }
    }

    let stats = app.session().tick_stats();
    app.stop_camera();
    println!(
        "frames dispatched {}, completed {}, failed {}",
        stats.dispatched, stats.completed, stats.failed
    );
    Ok(())
}

fn latest_message(app: &mut App, fallback: &str) -> String {
    app.notifier()
        .latest()
        .map(|note| note.message.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn camera_settings(args: &[&str], configured: bool) -> Settings {
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Camera {
            realtime,
            no_realtime,
            ..
        } = cli.command
        else {
            panic!("expected the camera subcommand");
        };
        let mut settings = Settings {
            realtime: configured,
            ..Settings::default()
        };
        apply_realtime_flags(&mut settings, realtime, no_realtime);
        settings
    }

    #[rstest]
    #[case::configured_on(&["mask-watch", "camera"], true, true)]
    #[case::configured_off(&["mask-watch", "camera"], false, false)]
    #[case::forced_on(&["mask-watch", "camera", "--realtime"], false, true)]
    #[case::forced_off(&["mask-watch", "camera", "--no-realtime"], true, false)]
    fn camera_flags_override_configured_realtime(
        #[case] args: &[&str],
        #[case] configured: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(camera_settings(args, configured).realtime, expected);
    }

    #[test]
    fn realtime_flags_conflict() {
        let parsed = Cli::try_parse_from(["mask-watch", "camera", "--realtime", "--no-realtime"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_overrides_apply_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mask-watch",
            "devices",
            "--server",
            "http://detector:8080",
            "--interval-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://detector:8080"));
        assert_eq!(cli.interval_ms, Some(500));
        assert!(matches!(cli.command, Command::Devices));
    }
}
