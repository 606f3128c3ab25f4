//! Run command - drive a headless map session with a scripted camera.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use vrmap::app::{AppConfig, VrMapApp};
use vrmap::geo::{CenterSource, GeoPoint};
use vrmap::sync::CameraPose;

use super::common::load_config;
use crate::error::CliError;

/// Time between simulated render ticks.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Ticks between status lines.
const STATUS_INTERVAL_TICKS: u64 = 30;

/// Eye height of the scripted camera in meters.
const EYE_HEIGHT_M: f64 = 1.6;

/// Arguments for the run command.
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ticks: u64,
    pub speed: f64,
    pub turn_rate: f64,
    pub max_add: Option<usize>,
}

/// Camera that walks forward and turns a little every tick.
#[derive(Debug, Clone)]
pub struct ScriptedCamera {
    position: DVec3,
    yaw: f64,
    speed: f64,
    turn_rate: f64,
}

impl ScriptedCamera {
    /// Camera at the scene origin facing north.
    ///
    /// `speed` is meters per tick, `turn_rate` degrees per tick.
    pub fn new(speed: f64, turn_rate: f64) -> Self {
        Self {
            position: DVec3::new(0.0, EYE_HEIGHT_M, 0.0),
            yaw: 0.0,
            speed,
            turn_rate,
        }
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose::new(self.position, DVec3::new(0.0, self.yaw, 0.0))
    }

    /// Step along the current heading (+x east, -z north), then turn.
    pub fn advance(&mut self) {
        let heading = self.yaw.to_radians();
        self.position += DVec3::new(heading.sin(), 0.0, -heading.cos()) * self.speed;
        self.yaw += self.turn_rate;
    }
}

fn center_source(args: &RunArgs, app: &VrMapApp) -> Result<CenterSource, CliError> {
    match (args.latitude, args.longitude, &args.preset) {
        (Some(lat), Some(lon), _) => Ok(CenterSource::Point(GeoPoint::new(lat, lon))),
        (_, _, Some(title)) => Ok(CenterSource::Preset(title.clone())),
        _ => app
            .config()
            .map
            .startup_preset()
            .map(CenterSource::from)
            .ok_or_else(|| CliError::Config("No location presets configured".to_string())),
    }
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let (map, source) = load_config(args.config.as_deref())?;
    let mut app_config = AppConfig::new(map);
    app_config.source = source;
    if let Some(limit) = args.max_add {
        app_config = app_config.with_max_feature_add_per_tick(limit);
    }

    let mut app = VrMapApp::start_sync(app_config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let center = center_source(&args, &app)?;
    let mut camera = ScriptedCamera::new(args.speed, args.turn_rate);
    let loaded = app.session_mut().load_scene(&center, None, &camera.pose())?;

    println!("VRMap v{}", vrmap::VERSION);
    println!("==========");
    println!();
    println!("Origin:      {}", loaded.origin.point());
    println!(
        "Layers:      {}",
        app.session()
            .layers()
            .ids()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "Add limit:   {} per tick ({})",
        app.session().config().max_feature_add_per_tick,
        app.session().config().drain_order
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut tick = 0u64;
    while !shutdown.load(Ordering::SeqCst) && (args.ticks == 0 || tick < args.ticks) {
        camera.advance();
        let pose = camera.pose();

        let session = app.session_mut();
        session.tick(&pose);
        std::thread::sleep(FRAME_INTERVAL);
        session.tock();
        tick += 1;

        if tick % STATUS_INTERVAL_TICKS == 0 {
            let stats = session.admission_stats();
            if let Some(geo) = session.camera_position() {
                println!(
                    "[tick {:>6}] {:>9.5} {:>10.5} {:>5.1}° | added {} | removed {} | pending {}",
                    tick,
                    geo.latitude,
                    geo.longitude,
                    geo.heading,
                    stats.admitted + stats.drained,
                    stats.removed,
                    session.pending_additions()
                );
            }
        }

        if session.producer_disconnected() {
            println!("Producer stopped; ending run.");
            break;
        }
    }

    let stats = app.session().admission_stats();
    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Ticks:            {}", tick);
    println!("  Added directly:   {}", stats.admitted);
    println!("  Added from queue: {}", stats.drained);
    println!("  Removed:          {}", stats.removed);
    println!("  Cancelled:        {}", stats.cancelled);
    println!("  Rejected:         {}", stats.rejected);
    println!("  Queue high water: {}", stats.queue_high_water);

    app.shutdown_sync();
    Ok(())
}
