use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{Workout, WorkoutStatus};
use super::stats;
use crate::error::WorkoutError;
use crate::rep::Hand;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepRecord {
    /// Unix 時刻 (ミリ秒)
    pub timestamp: i64,
    pub hand: Hand,
}

/// 終了したワークアウトの保存用レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutMetadata {
    pub workout_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// ミリ秒
    pub duration: u64,
    pub total_reps: usize,
    /// ワークアウト全体の平均RPM
    pub rpm: u32,
    pub reps: Vec<RepRecord>,
    /// 録画ファイルサイズ (バイト)
    pub video_size: u64,
}

impl WorkoutMetadata {
    /// 停止済みのワークアウトのみ変換できる
    pub fn from_workout(workout: &Workout, video_size: u64) -> Result<Self, WorkoutError> {
        let (Some(start_time), Some(end_time)) = (workout.start_time(), workout.end_time()) else {
            return Err(WorkoutError::NotStopped);
        };
        if workout.status() != WorkoutStatus::Stopped {
            return Err(WorkoutError::NotStopped);
        }

        let duration = workout.elapsed_ms_at(end_time);
        Ok(Self {
            workout_id: workout.id().to_string(),
            start_time,
            end_time,
            duration,
            total_reps: workout.rep_count(),
            rpm: stats::average_rpm(workout.rep_count(), duration),
            reps: workout
                .reps()
                .iter()
                .map(|rep| RepRecord {
                    timestamp: rep.timestamp.timestamp_millis(),
                    hand: rep.hand,
                })
                .collect(),
            video_size,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 一覧表示用のサマリー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSummary {
    pub workout_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u64,
    pub total_reps: usize,
    pub rpm: u32,
    #[serde(rename = "videoSizeInMB")]
    pub video_size_in_mb: f64,
}

impl From<&WorkoutMetadata> for WorkoutSummary {
    fn from(meta: &WorkoutMetadata) -> Self {
        Self {
            workout_id: meta.workout_id.clone(),
            start_time: meta.start_time,
            end_time: meta.end_time,
            duration: meta.duration,
            total_reps: meta.total_reps,
            rpm: meta.rpm,
            video_size_in_mb: meta.video_size as f64 / BYTES_PER_MB,
        }
    }
}
