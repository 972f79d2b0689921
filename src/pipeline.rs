//! フレーム単位の処理: デコード → 座標復元 → rep 判定 → ワークアウト更新 → イベント通知
//!
//! セッションごとに `RepPipeline` と `Workout` を1つずつ持ち、単一のフレームループから駆動する。
//! ブロッキングやロックはしない

use chrono::{DateTime, Utc};
use log::debug;
use ndarray::ArrayView3;
use serde::Serialize;

use crate::config::Config;
use crate::error::{DecodeError, WorkoutError};
use crate::pose::{Detection, LetterboxTransform};
use crate::rep::{Rep, RepCounter, RepState};
use crate::workout::{EventBus, SubscriptionId, Workout, WorkoutEvent, WorkoutStatus};

/// `[1, 5 + 3K, N]` のモデル出力をデコードし、元フレーム座標に戻す
pub fn decode_frame(
    output: ArrayView3<f32>,
    transform: &LetterboxTransform,
) -> Result<Detection, DecodeError> {
    Ok(Detection::decode(output)?.remap(transform))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectRepResult {
    pub rep: Option<Rep>,
    pub total_reps: usize,
}

impl DetectRepResult {
    pub fn rep_detected(&self) -> bool {
        self.rep.is_some()
    }
}

/// UI の開始/停止ボタン用の状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkoutStatusReport {
    pub status: WorkoutStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub can_start: bool,
    pub can_stop: bool,
    pub rep_count: usize,
}

impl WorkoutStatusReport {
    pub fn of(workout: &Workout) -> Self {
        let status = workout.status();
        Self {
            status,
            start_time: workout.start_time(),
            end_time: workout.end_time(),
            can_start: matches!(status, WorkoutStatus::Idle | WorkoutStatus::Stopped),
            can_stop: status == WorkoutStatus::Active,
            rep_count: workout.rep_count(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RepPipeline {
    counter: RepCounter,
    events: EventBus,
}

impl RepPipeline {
    pub fn new(counter: RepCounter) -> Self {
        Self {
            counter,
            events: EventBus::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RepCounter::from_config(&config.rep))
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&WorkoutEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn rep_state(&self) -> RepState {
        self.counter.state()
    }

    pub fn start_workout(&mut self, workout: &mut Workout) -> Result<(), WorkoutError> {
        self.start_workout_at(workout, Utc::now())
    }

    /// ワークアウト開始。rep 判定もリセットする
    pub fn start_workout_at(
        &mut self,
        workout: &mut Workout,
        now: DateTime<Utc>,
    ) -> Result<(), WorkoutError> {
        let event = workout.start_at(now)?;
        self.counter.reset_at(now);
        self.events.publish(&event);
        Ok(())
    }

    pub fn stop_workout(&mut self, workout: &mut Workout) -> Result<(), WorkoutError> {
        self.stop_workout_at(workout, Utc::now())
    }

    pub fn stop_workout_at(
        &mut self,
        workout: &mut Workout,
        now: DateTime<Utc>,
    ) -> Result<(), WorkoutError> {
        let event = workout.stop_at(now)?;
        self.events.publish(&event);
        Ok(())
    }

    pub fn detect_rep(&mut self, detection: &Detection, workout: &mut Workout) -> DetectRepResult {
        self.detect_rep_at(detection, workout, Utc::now())
    }

    /// 1フレーム分の検出結果を処理。ワークアウト中以外は無視
    pub fn detect_rep_at(
        &mut self,
        detection: &Detection,
        workout: &mut Workout,
        now: DateTime<Utc>,
    ) -> DetectRepResult {
        if !workout.is_active() {
            return DetectRepResult {
                rep: None,
                total_reps: workout.rep_count(),
            };
        }

        let rep = self.counter.detect_at(detection, now);
        if let Some(rep) = rep {
            let updated = workout.add_rep_at(rep, now);
            debug!("{}: rep #{} ({:?})", workout.id(), workout.rep_count(), rep.hand);
            self.events.publish(&updated);
            self.events.publish(&WorkoutEvent::StatusChanged {
                workout_id: workout.id().to_string(),
                status: workout.status(),
            });
        }

        DetectRepResult {
            rep,
            total_reps: workout.rep_count(),
        }
    }

    pub fn tick(&mut self, workout: &Workout) -> bool {
        self.tick_at(workout, Utc::now())
    }

    /// 定期更新。ワークアウト中のみ通知する
    pub fn tick_at(&mut self, workout: &Workout, now: DateTime<Utc>) -> bool {
        if !workout.is_active() {
            return false;
        }
        self.events.publish(&workout.updated_event(now));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{BoundingBox, Keypoint, KeypointIndex};
    use crate::rep::{Hand, RepStateMachine};
    use chrono::{Duration, TimeZone};
    use ndarray::Array3;
    use std::sync::{Arc, Mutex};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn detection(hands_up: bool) -> Detection {
        let wrist_y = if hands_up { 100.0 } else { 400.0 };
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, 0.9); KeypointIndex::COUNT];
        keypoints[KeypointIndex::Nose as usize] = Keypoint::new(320.0, 200.0, 0.9);
        keypoints[KeypointIndex::LeftWrist as usize] = Keypoint::new(250.0, wrist_y, 0.9);
        keypoints[KeypointIndex::RightWrist as usize] = Keypoint::new(390.0, wrist_y, 0.9);
        Detection {
            bbox: BoundingBox::new(100.0, 50.0, 540.0, 470.0),
            score: 0.9,
            keypoints,
        }
    }

    fn pipeline() -> (RepPipeline, Arc<Mutex<Vec<WorkoutEvent>>>) {
        let counter = RepCounter::new(RepStateMachine::starting_at(
            0.5,
            Duration::milliseconds(300),
            t0(),
        ));
        let mut p = RepPipeline::new(counter);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        p.subscribe(move |e: &WorkoutEvent| sink.lock().unwrap().push(e.clone()));
        (p, events)
    }

    #[test]
    fn test_decode_frame_remaps() {
        // 候補1つ、17キーポイント、モデル座標の中央
        let mut row: Vec<f32> = vec![320.0, 320.0, 64.0, 64.0, 0.8];
        for _ in 0..KeypointIndex::COUNT {
            row.extend_from_slice(&[320.0, 320.0, 0.7]);
        }
        let output = Array3::from_shape_fn((1, row.len(), 1), |(_, c, _)| row[c]);
        let transform = LetterboxTransform::new(1280, 720, 640).unwrap();

        let det = decode_frame(output.view(), &transform).unwrap();
        assert_eq!(det.bbox, BoundingBox::new(576.0, 296.0, 704.0, 424.0));
        assert_eq!(det.keypoints[0], Keypoint::new(640.0, 360.0, 0.7));
    }

    #[test]
    fn test_frames_ignored_when_not_active() {
        let (mut p, events) = pipeline();
        let mut w = Workout::new("w1");
        let result = p.detect_rep_at(&detection(true), &mut w, at(500));
        assert!(!result.rep_detected());
        assert_eq!(result.total_reps, 0);
        assert_eq!(p.rep_state(), RepState::Down);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rep_flow_publishes_events() {
        let (mut p, events) = pipeline();
        let mut w = Workout::new("w1");
        p.start_workout_at(&mut w, at(0)).unwrap();

        assert!(!p.detect_rep_at(&detection(true), &mut w, at(300)).rep_detected());
        let result = p.detect_rep_at(&detection(true), &mut w, at(600));
        assert_eq!(result.rep, Some(Rep::new(Hand::Both, at(600))));
        assert_eq!(result.total_reps, 1);

        // 保持しても増えない
        assert!(!p.detect_rep_at(&detection(true), &mut w, at(1200)).rep_detected());

        let events = events.lock().unwrap();
        // 開始 + rep 更新 + rep ステータス
        assert_eq!(events.len(), 3);
        match &events[1] {
            WorkoutEvent::Updated { workout_id, stats } => {
                assert_eq!(workout_id, "w1");
                assert_eq!(stats.rep_count, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[2],
            WorkoutEvent::StatusChanged {
                workout_id: "w1".to_string(),
                status: WorkoutStatus::Active,
            }
        );
    }

    #[test]
    fn test_start_resets_rep_state() {
        let (mut p, _) = pipeline();
        let mut w = Workout::new("w1");
        p.start_workout_at(&mut w, at(0)).unwrap();
        p.detect_rep_at(&detection(true), &mut w, at(300));
        assert_eq!(p.rep_state(), RepState::Up);

        p.stop_workout_at(&mut w, at(400)).unwrap();
        p.start_workout_at(&mut w, at(1000)).unwrap();
        assert_eq!(p.rep_state(), RepState::Down);

        // 再開時刻から Down タイマー再開
        p.detect_rep_at(&detection(true), &mut w, at(1200));
        assert_eq!(p.rep_state(), RepState::Down);
    }

    #[test]
    fn test_lifecycle_errors_propagate() {
        let (mut p, events) = pipeline();
        let mut w = Workout::new("w1");
        assert_eq!(p.stop_workout_at(&mut w, at(0)), Err(WorkoutError::NotActive));
        p.start_workout_at(&mut w, at(0)).unwrap();
        assert_eq!(p.start_workout_at(&mut w, at(5)), Err(WorkoutError::AlreadyActive));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_tick_only_while_active() {
        let (mut p, events) = pipeline();
        let mut w = Workout::new("w1");
        assert!(!p.tick_at(&w, at(0)));

        p.start_workout_at(&mut w, at(0)).unwrap();
        assert!(p.tick_at(&w, at(1000)));
        p.stop_workout_at(&mut w, at(1500)).unwrap();
        assert!(!p.tick_at(&w, at(2000)));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        match &events[1] {
            WorkoutEvent::Updated { stats, .. } => assert_eq!(stats.elapsed_time, 1000),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_status_report() {
        let mut w = Workout::new("w1");
        let r = WorkoutStatusReport::of(&w);
        assert!(r.can_start && !r.can_stop);

        w.start_at(t0()).unwrap();
        let r = WorkoutStatusReport::of(&w);
        assert!(!r.can_start && r.can_stop);
        assert_eq!(r.start_time, Some(t0()));

        w.stop_at(at(100)).unwrap();
        let r = WorkoutStatusReport::of(&w);
        assert!(r.can_start && !r.can_stop);
        assert_eq!(r.status, WorkoutStatus::Stopped);
    }
}
