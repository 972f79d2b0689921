use thiserror::Error;

/// `[1, 5 + 3K, N]` 形式に合わないモデル出力
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("model output has no candidate detections")]
    NoCandidates,

    #[error("expected batch size 1, got {0}")]
    BatchSize(usize),

    #[error("channel count {0} is not 5 + 3 * keypoints")]
    ChannelCount(usize),

    #[error("buffer holds {actual} values, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("frame size {width}x{height} has a zero dimension")]
    EmptyFrame { width: u32, height: u32 },

    #[error("model input size must be non-zero")]
    EmptyModelInput,
}

/// ワークアウトの状態遷移エラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkoutError {
    #[error("cannot start workout that is already active")]
    AlreadyActive,

    #[error("cannot stop workout that is not active")]
    NotActive,

    #[error("workout has not been stopped")]
    NotStopped,
}
