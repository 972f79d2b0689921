use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use super::events::WorkoutEvent;
use super::stats::{self, WorkoutStats, DEFAULT_RPM_WINDOW_SECONDS};
use crate::config::StatsConfig;
use crate::error::WorkoutError;
use crate::rep::Rep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutStatus {
    Idle,
    Active,
    Stopped,
}

/// 1回分のワークアウト: idle → active → stopped
///
/// 開始/終了時刻と rep 一覧を保持し、`WorkoutStats` は読み出しのたびに再計算する
#[derive(Debug, Clone)]
pub struct Workout {
    id: String,
    status: WorkoutStatus,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    reps: Vec<Rep>,
    rpm_window: Duration,
}

impl Workout {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WorkoutStatus::Idle,
            start_time: None,
            end_time: None,
            reps: Vec::new(),
            rpm_window: Duration::seconds(DEFAULT_RPM_WINDOW_SECONDS),
        }
    }

    /// `workout_<RFC 3339 time>`
    pub fn with_timestamp_id(now: DateTime<Utc>) -> Self {
        Self::new(format!(
            "workout_{}",
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        ))
    }

    /// 現在RPMの集計ウィンドウ
    pub fn with_rpm_window(mut self, window: Duration) -> Self {
        self.rpm_window = window;
        self
    }

    pub fn with_config(self, config: &StatsConfig) -> Self {
        let window = config
            .rpm_window()
            .unwrap_or_else(|_| Duration::seconds(DEFAULT_RPM_WINDOW_SECONDS));
        self.with_rpm_window(window)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> WorkoutStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn reps(&self) -> &[Rep] {
        &self.reps
    }

    pub fn rep_count(&self) -> usize {
        self.reps.len()
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkoutStatus::Active
    }

    pub fn start(&mut self) -> Result<WorkoutEvent, WorkoutError> {
        self.start_at(Utc::now())
    }

    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<WorkoutEvent, WorkoutError> {
        if self.is_active() {
            return Err(WorkoutError::AlreadyActive);
        }
        self.status = WorkoutStatus::Active;
        self.start_time = Some(now);
        self.end_time = None;
        info!("workout {} started", self.id);
        Ok(self.updated_event(now))
    }

    pub fn stop(&mut self) -> Result<WorkoutEvent, WorkoutError> {
        self.stop_at(Utc::now())
    }

    pub fn stop_at(&mut self, now: DateTime<Utc>) -> Result<WorkoutEvent, WorkoutError> {
        if !self.is_active() {
            return Err(WorkoutError::NotActive);
        }
        self.status = WorkoutStatus::Stopped;
        self.end_time = Some(now);
        info!(
            "workout {} stopped after {} with {} reps",
            self.id,
            stats::format_elapsed(self.elapsed_ms_at(now)),
            self.reps.len()
        );
        Ok(self.updated_event(now))
    }

    /// 無条件に追加。`is_active` の判定は呼び出し側
    pub fn add_rep(&mut self, rep: Rep) -> WorkoutEvent {
        self.add_rep_at(rep, Utc::now())
    }

    pub fn add_rep_at(&mut self, rep: Rep, now: DateTime<Utc>) -> WorkoutEvent {
        self.reps.push(rep);
        self.updated_event(now)
    }

    pub fn elapsed_ms_at(&self, now: DateTime<Utc>) -> u64 {
        stats::elapsed_ms(self.status, self.start_time, self.end_time, now)
    }

    pub fn stats(&self) -> WorkoutStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> WorkoutStats {
        let elapsed = self.elapsed_ms_at(now);
        let counting = self.status != WorkoutStatus::Idle;

        WorkoutStats {
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            is_active: self.is_active(),
            rep_count: self.reps.len(),
            elapsed_time: elapsed,
            formatted_time: stats::format_elapsed(elapsed),
            average_rpm: if counting {
                stats::average_rpm(self.reps.len(), elapsed)
            } else {
                0
            },
            current_rpm: if counting {
                stats::current_rpm(&self.reps, self.start_time, now, self.rpm_window)
            } else {
                0
            },
            reps: self.reps.clone(),
        }
    }

    pub(crate) fn updated_event(&self, now: DateTime<Utc>) -> WorkoutEvent {
        WorkoutEvent::Updated {
            workout_id: self.id.clone(),
            stats: self.stats_at(now),
        }
    }
}
