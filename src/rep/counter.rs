use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::{Hand, RepKeypoints, RepState, RepStateMachine};
use crate::config::RepConfig;
use crate::pose::{Detection, KeypointIndex};

/// カウントされた1回分の rep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rep {
    pub hand: Hand,
    pub timestamp: DateTime<Utc>,
}

impl Rep {
    pub fn new(hand: Hand, timestamp: DateTime<Utc>) -> Self {
        Self { hand, timestamp }
    }
}

/// フレームごとの検出結果からタイムスタンプ付き rep を作る
#[derive(Debug, Clone, Default)]
pub struct RepCounter {
    machine: RepStateMachine,
}

impl RepCounter {
    pub fn new(machine: RepStateMachine) -> Self {
        Self { machine }
    }

    pub fn from_config(config: &RepConfig) -> Self {
        Self::new(RepStateMachine::from_config(config))
    }

    /// 17点の検出結果から鼻と手首を取り出す
    ///
    /// キーポイントが3点未満なら `None`。手首が欠けている場合は (0, 0, 0) 扱いで
    /// 信頼度判定で弾かれる
    pub fn extract_keypoints(detection: &Detection) -> Option<RepKeypoints> {
        if detection.keypoints.len() < 3 {
            return None;
        }
        let wrist = |index: KeypointIndex| detection.keypoint(index).copied().unwrap_or_default();

        Some(RepKeypoints {
            nose: detection.keypoints[KeypointIndex::Nose as usize],
            left_wrist: wrist(KeypointIndex::LeftWrist),
            right_wrist: wrist(KeypointIndex::RightWrist),
        })
    }

    pub fn detect(&mut self, detection: &Detection) -> Option<Rep> {
        self.detect_at(detection, Utc::now())
    }

    pub fn detect_at(&mut self, detection: &Detection, now: DateTime<Utc>) -> Option<Rep> {
        let keypoints = Self::extract_keypoints(detection)?;
        self.machine
            .process_at(&keypoints, now)
            .map(|hand| Rep::new(hand, now))
    }

    pub fn state(&self) -> RepState {
        self.machine.current_state()
    }

    pub fn reset(&mut self) {
        self.machine.reset();
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.machine.reset_at(now);
    }
}
