//! ワークアウト統計。常に開始/終了時刻と rep 一覧から計算する。
//!
//! 経過時間が 0 のときは割り算せず 0 を返す

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::session::WorkoutStatus;
use crate::rep::Rep;

pub const DEFAULT_RPM_WINDOW_SECONDS: i64 = 20;

const MS_PER_MINUTE: f64 = 60_000.0;

/// ある時点のワークアウト状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutStats {
    pub status: WorkoutStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub rep_count: usize,
    pub elapsed_time: u64,
    pub formatted_time: String,
    #[serde(rename = "averageRPM")]
    pub average_rpm: u32,
    #[serde(rename = "currentRPM")]
    pub current_rpm: u32,
    pub reps: Vec<Rep>,
}

/// 開始からの経過ミリ秒。停止後は終了時刻で固定
pub fn elapsed_ms(
    status: WorkoutStatus,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    let elapsed = match (status, start, end) {
        (WorkoutStatus::Active, Some(start), _) => now - start,
        (WorkoutStatus::Stopped, Some(start), Some(end)) => end - start,
        _ => return 0,
    };
    elapsed.num_milliseconds().max(0) as u64
}

/// `mm:ss` 形式。60分以上も分で表示 ("125:30")
pub fn format_elapsed(elapsed_ms: u64) -> String {
    let total_seconds = elapsed_ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn per_minute(count: usize, duration_ms: f64) -> u32 {
    if count == 0 || duration_ms <= 0.0 {
        return 0;
    }
    (count as f64 / (duration_ms / MS_PER_MINUTE)).round() as u32
}

/// セッション全体の平均RPM
pub fn average_rpm(rep_count: usize, elapsed_ms: u64) -> u32 {
    per_minute(rep_count, elapsed_ms as f64)
}

/// 直近 `window` の RPM
///
/// 分母は `now - max(now - window, session_start)`。セッションが窓より短い場合は
/// 実際の経過時間で割る
pub fn current_rpm(
    reps: &[Rep],
    session_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> u32 {
    let Some(session_start) = session_start else {
        return 0;
    };

    // 表現範囲外まで遡る窓はセッション開始で切る
    let window_start = now
        .checked_sub_signed(window)
        .map_or(session_start, |start| start.max(session_start));
    let in_window = reps
        .iter()
        .filter(|rep| rep.timestamp >= window_start)
        .count();
    if in_window == 0 {
        return 0;
    }

    let duration_ms = (now - window_start).num_milliseconds();
    per_minute(in_window, duration_ms as f64)
}
