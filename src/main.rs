use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use log::info;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};

use rep_tracker::config::Config;
use rep_tracker::pipeline::RepPipeline;
use rep_tracker::pose::Detection;
use rep_tracker::workout::{Workout, WorkoutEvent, WorkoutMetadata};

const CONFIG_PATH: &str = "rep_tracker.toml";

/// 記録トレースの1行
#[derive(Debug, Deserialize)]
struct FrameRecord {
    /// 記録開始からの経過ミリ秒
    t_ms: i64,
    /// このフレームで出力がなかった場合は省略
    #[serde(default)]
    detection: Option<Detection>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(trace_path) = args.next() else {
        bail!("usage: rep-tracker <trace.jsonl> [config.toml]");
    };
    let config_path = args.next().unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    info!("Rep Tracker ({})", env!("REP_TRACKER_VERSION"));
    info!("Trace: {}", trace_path);
    info!(
        "Rep gate: confidence >= {}, min phase {} ms",
        config.rep.confidence_threshold, config.rep.min_state_duration_ms
    );

    // ここを基準とした仮想時計で再生
    let base = Utc::now();
    let mut workout = Workout::with_timestamp_id(base).with_config(&config.stats);
    let mut pipeline = RepPipeline::from_config(&config);
    pipeline.subscribe(|event: &WorkoutEvent| {
        if let WorkoutEvent::Updated { workout_id, stats } = event {
            info!(
                "{} [{}] reps={} avg={} rpm current={} rpm",
                workout_id, stats.formatted_time, stats.rep_count, stats.average_rpm, stats.current_rpm
            );
        }
    });
    pipeline.start_workout_at(&mut workout, base)?;

    let file = File::open(&trace_path).with_context(|| format!("failed to open {}", trace_path))?;
    let tick_interval = (config.stats.timer_interval_ms as i64).max(1);
    let mut next_tick = tick_interval;
    let mut last_t = 0;

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid frame record", trace_path, i + 1))?;
        if frame.t_ms < last_t {
            bail!(
                "{}:{}: timestamp {} ms goes backwards (previous {} ms)",
                trace_path,
                i + 1,
                frame.t_ms,
                last_t
            );
        }
        last_t = frame.t_ms;

        while next_tick <= frame.t_ms {
            pipeline.tick_at(&workout, base + Duration::milliseconds(next_tick));
            next_tick += tick_interval;
        }

        if let Some(detection) = frame.detection {
            pipeline.detect_rep_at(&detection, &mut workout, base + Duration::milliseconds(frame.t_ms));
        }
    }

    pipeline.stop_workout_at(&mut workout, base + Duration::milliseconds(last_t))?;

    let metadata = WorkoutMetadata::from_workout(&workout, 0)?;
    println!("{}", metadata.to_json()?);
    Ok(())
}
