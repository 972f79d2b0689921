use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rep_tracker::config::Config;
use rep_tracker::pipeline::RepPipeline;
use rep_tracker::pose::PoseModel;
use rep_tracker::workout::{Workout, WorkoutEvent, WorkoutMetadata};

const CONFIG_PATH: &str = "rep_tracker.toml";
/// 連続でこの回数だけ空フレームが続いたらカメラ切断とみなす
const MAX_EMPTY_FRAMES: u32 = 100;
const EMPTY_FRAME_BACKOFF: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH);
    info!("Rep Camera ({})", env!("REP_TRACKER_VERSION"));

    let camera_index = config.model.camera_index;
    let mut capture = VideoCapture::new(camera_index, videoio::CAP_ANY)
        .context("Failed to open camera")?;
    if !capture.is_opened()? {
        anyhow::bail!("Camera {} is not available", camera_index);
    }
    capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

    info!("Loading model from {}...", config.model.path);
    let mut model = PoseModel::new(&config.model.path, config.model.input_size as i32)?;
    info!("Model loaded ({}x{})", model.input_size(), model.input_size());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    let mut pipeline = RepPipeline::from_config(&config);
    pipeline.subscribe(|event: &WorkoutEvent| match event {
        WorkoutEvent::Updated { workout_id, stats } => info!(
            "{} [{}] reps={} avg={} rpm current={} rpm",
            workout_id, stats.formatted_time, stats.rep_count, stats.average_rpm, stats.current_rpm
        ),
        WorkoutEvent::StatusChanged { workout_id, status } => {
            debug!("{} status {:?}", workout_id, status)
        }
    });

    let mut workout = Workout::with_timestamp_id(Utc::now()).with_config(&config.stats);
    pipeline.start_workout(&mut workout)?;
    info!("Workout running, press Ctrl-C to stop");

    let tick_interval = Duration::from_millis(config.stats.timer_interval_ms);
    let mut last_tick = Instant::now();
    let mut frame = Mat::default();
    let mut empty_frames = 0u32;

    while running.load(Ordering::SeqCst) {
        if !capture.read(&mut frame)? || frame.empty() {
            empty_frames += 1;
            if empty_frames >= MAX_EMPTY_FRAMES {
                warn!("{} empty frames in a row, camera lost", empty_frames);
                break;
            }
            if empty_frames == 1 {
                warn!("Empty frame received");
            }
            std::thread::sleep(EMPTY_FRAME_BACKOFF);
            continue;
        }
        empty_frames = 0;

        let detection = match model.detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                warn!("Inference error: {:#}", e);
                continue;
            }
        };

        if detection.is_renderable(config.model.render_confidence) {
            debug!(
                "person score {:.2}, {} visible keypoints",
                detection.score,
                detection.visible_keypoints(config.model.render_confidence).count()
            );
        }

        pipeline.detect_rep(&detection, &mut workout);

        if last_tick.elapsed() >= tick_interval {
            pipeline.tick(&workout);
            last_tick = Instant::now();
        }
    }

    pipeline.stop_workout(&mut workout)?;
    let metadata = WorkoutMetadata::from_workout(&workout, 0)?;
    println!("{}", metadata.to_json()?);
    Ok(())
}
