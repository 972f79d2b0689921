use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::RepConfig;
use crate::pose::Keypoint;

/// rep 成立時に鼻より上にあった手首
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepState {
    Down,
    Up,
}

/// 挙上判定に使う3点 (鼻・左右手首)。Y は下向きが正
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RepKeypoints {
    pub nose: Keypoint,
    pub left_wrist: Keypoint,
    pub right_wrist: Keypoint,
}

impl RepKeypoints {
    /// 3点すべての信頼度が閾値以上か
    pub fn is_confident(&self, threshold: f32) -> bool {
        [self.nose, self.left_wrist, self.right_wrist]
            .iter()
            .all(|kp| kp.is_valid(threshold))
    }

    pub fn left_up(&self) -> bool {
        self.left_wrist.y < self.nose.y
    }

    pub fn right_up(&self) -> bool {
        self.right_wrist.y < self.nose.y
    }

    /// 上がっている手。優先度は Both > Left > Right
    pub fn raised_hand(&self) -> Option<Hand> {
        match (self.left_up(), self.right_up()) {
            (true, true) => Some(Hand::Both),
            (true, false) => Some(Hand::Left),
            (false, true) => Some(Hand::Right),
            (false, false) => None,
        }
    }
}

/// 手首が鼻より上に上がる動作のヒステリシス判定
///
/// フェーズ切り替えには現フェーズが `min_state_duration` 以上続いている必要がある。
/// 1回の Up フェーズで数える rep は最大1回。
/// 低信頼度のサンプルは完全に無視し、フェーズタイマーも進めない・戻さない
#[derive(Debug, Clone)]
pub struct RepStateMachine {
    confidence_threshold: f32,
    min_state_duration: Duration,
    state: RepState,
    state_started: DateTime<Utc>,
    rep_counted_in_cycle: bool,
}

impl RepStateMachine {
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_MIN_STATE_DURATION_MS: i64 = 300;

    pub fn new(confidence_threshold: f32, min_state_duration: Duration) -> Self {
        Self::starting_at(confidence_threshold, min_state_duration, Utc::now())
    }

    /// `now` に Down フェーズを開始した状態で生成
    pub fn starting_at(
        confidence_threshold: f32,
        min_state_duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            confidence_threshold,
            min_state_duration,
            state: RepState::Down,
            state_started: now,
            rep_counted_in_cycle: false,
        }
    }

    pub fn from_config(config: &RepConfig) -> Self {
        let min_state_duration = config
            .min_state_duration()
            .unwrap_or_else(|_| Duration::milliseconds(Self::DEFAULT_MIN_STATE_DURATION_MS));
        Self::new(config.confidence_threshold, min_state_duration)
    }

    pub fn current_state(&self) -> RepState {
        self.state
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn process(&mut self, keypoints: &RepKeypoints) -> Option<Hand> {
        self.process_at(keypoints, Utc::now())
    }

    /// `now` 時点のサンプルを1つ処理し、rep が成立したら手を返す
    /// サンプルは時刻順に渡すこと
    pub fn process_at(&mut self, keypoints: &RepKeypoints, now: DateTime<Utc>) -> Option<Hand> {
        if !keypoints.is_confident(self.confidence_threshold) {
            return None;
        }

        let raised = keypoints.raised_hand();
        let held = now - self.state_started >= self.min_state_duration;
        if !held {
            return None;
        }

        match (self.state, raised) {
            (RepState::Down, Some(_)) => {
                self.enter(RepState::Up, now);
                self.rep_counted_in_cycle = false;
                None
            }
            (RepState::Up, Some(hand)) if !self.rep_counted_in_cycle => {
                self.rep_counted_in_cycle = true;
                debug!("rep counted ({:?})", hand);
                Some(hand)
            }
            (RepState::Up, None) => {
                self.enter(RepState::Down, now);
                None
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    /// 初期状態 (Down) に戻し、タイマーを `now` から再開
    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.state = RepState::Down;
        self.state_started = now;
        self.rep_counted_in_cycle = false;
    }

    fn enter(&mut self, state: RepState, now: DateTime<Utc>) {
        debug!(
            "rep state {:?} -> {:?} after {} ms",
            self.state,
            state,
            (now - self.state_started).num_milliseconds()
        );
        self.state = state;
        self.state_started = now;
    }
}

impl Default for RepStateMachine {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_CONFIDENCE_THRESHOLD,
            Duration::milliseconds(Self::DEFAULT_MIN_STATE_DURATION_MS),
        )
    }
}
