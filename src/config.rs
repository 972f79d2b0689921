use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub rep: RepConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// YOLOv8-pose の ONNX ファイル
    #[serde(default = "default_model_path")]
    pub path: String,
    /// モデル入力サイズ (正方形)
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// オーバーレイ描画の閾値 (rep 判定とは別)
    #[serde(default = "default_render_confidence")]
    pub render_confidence: f32,
    #[serde(default)]
    pub camera_index: i32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RepConfig {
    /// 鼻・手首の最低信頼度
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// フェーズ切り替えまでの最小継続時間
    #[serde(default = "default_min_state_duration_ms")]
    pub min_state_duration_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StatsConfig {
    /// 現在RPMの集計ウィンドウ
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// ワークアウト中の定期更新間隔
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,
}

fn default_model_path() -> String { "models/yolov8n-pose.onnx".to_string() }
fn default_input_size() -> u32 { 640 }
fn default_render_confidence() -> f32 { 0.5 }
fn default_confidence_threshold() -> f32 { 0.5 }
fn default_min_state_duration_ms() -> u64 { 300 }
fn default_window_seconds() -> u64 { 20 }
fn default_timer_interval_ms() -> u64 { 1000 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_size: default_input_size(),
            render_confidence: default_render_confidence(),
            camera_index: 0,
        }
    }
}

impl Default for RepConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_state_duration_ms: default_min_state_duration_ms(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            timer_interval_ms: default_timer_interval_ms(),
        }
    }
}

impl RepConfig {
    /// フェーズ切り替えに必要な最小継続時間
    pub fn min_state_duration(&self) -> Result<TimeDelta> {
        i64::try_from(self.min_state_duration_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .with_context(|| {
                format!("rep.min_state_duration_ms out of range: {}", self.min_state_duration_ms)
            })
    }
}

impl StatsConfig {
    /// 現在RPMの集計ウィンドウ
    pub fn rpm_window(&self) -> Result<TimeDelta> {
        i64::try_from(self.window_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .with_context(|| format!("stats.window_seconds out of range: {}", self.window_seconds))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.rep.min_state_duration()?;
        config.stats.rpm_window()?;
        Ok(config)
    }

    /// 読み込み。ファイルがない・不正な場合はデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}
