use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::keypoint::{Keypoint, KeypointIndex};
use crate::error::DecodeError;

/// 候補行のスコアのチャンネル: cx, cy, w, h, score, keypoints...
const SCORE_CHANNEL: usize = 4;
/// 先頭キーポイントのチャンネル
const KEYPOINT_CHANNEL: usize = 5;

/// `channels` (= 5 + 3K) に含まれるキーポイント数
pub fn keypoint_count(channels: usize) -> Result<usize, DecodeError> {
    if channels < KEYPOINT_CHANNEL || (channels - KEYPOINT_CHANNEL) % 3 != 0 {
        return Err(DecodeError::ChannelCount(channels));
    }
    Ok((channels - KEYPOINT_CHANNEL) / 3)
}

/// 最高スコアの候補インデックス。同点なら先頭を採る
///
/// NaN は選ばれない。空、または全て NaN なら `None`
pub fn best_candidate<I>(scores: I) -> Option<usize>
where
    I: IntoIterator<Item = f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// 左上・右下形式のボックス。クランプしないのでフレーム外の座標もありうる
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 中心形式 (cx, cy, w, h) → 左上・右下形式
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            x1: cx - half_w,
            y1: cy - half_h,
            x2: cx + half_w,
            y2: cy + half_h,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 左右反転 (ミラー表示用)
    pub fn mirrored(&self, frame_width: f32) -> Self {
        Self {
            x1: frame_width - self.x2,
            y1: self.y1,
            x2: frame_width - self.x1,
            y2: self.y2,
        }
    }
}

/// 1回の推論から得た最良の1人分の姿勢
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// モデルの生スコア (クランプなし)
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

impl Detection {
    /// YOLOv8-pose の `[1, 5 + 3K, N]` 出力をデコード
    ///
    /// スコアに関係なく最高スコアの候補を返す。閾値判定は呼び出し側で行う。
    /// 座標はモデル入力座標のまま
    pub fn decode(output: ArrayView3<f32>) -> Result<Self, DecodeError> {
        let (batch, channels, candidates) = output.dim();
        if batch != 1 {
            return Err(DecodeError::BatchSize(batch));
        }
        keypoint_count(channels)?;
        if candidates == 0 {
            return Err(DecodeError::NoCandidates);
        }

        // [C, N] -> [N, C]: 1候補1行
        let rows = output.index_axis(Axis(0), 0).reversed_axes();

        let best = best_candidate(rows.column(SCORE_CHANNEL).iter().copied())
            .ok_or(DecodeError::NoCandidates)?;
        let row = rows.row(best);

        let bbox = BoundingBox::from_center(row[0], row[1], row[2], row[3]);
        let values: Vec<f32> = row.iter().skip(KEYPOINT_CHANNEL).copied().collect();
        let keypoints = values
            .chunks_exact(3)
            .map(|kp| Keypoint::from([kp[0], kp[1], kp[2]]))
            .collect();

        Ok(Self {
            bbox,
            score: row[SCORE_CHANNEL],
            keypoints,
        })
    }

    /// 行優先のフラットな `[1, channels, candidates]` バッファをデコード
    pub fn decode_flat(data: &[f32], channels: usize, candidates: usize) -> Result<Self, DecodeError> {
        let Some(expected) = channels.checked_mul(candidates) else {
            return Err(DecodeError::BufferLength {
                expected: usize::MAX,
                actual: data.len(),
            });
        };
        if data.len() != expected {
            return Err(DecodeError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        let view = ArrayView3::from_shape((1, channels, candidates), data).map_err(|_| {
            DecodeError::BufferLength {
                expected,
                actual: data.len(),
            }
        })?;
        Self::decode(view)
    }

    pub fn keypoint(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints.get(index as usize)
    }

    /// オーバーレイを描画するか
    pub fn is_renderable(&self, threshold: f32) -> bool {
        self.score >= threshold
    }

    /// 描画対象のキーポイント (閾値より大きいもの)
    pub fn visible_keypoints(&self, threshold: f32) -> impl Iterator<Item = &Keypoint> + '_ {
        self.keypoints
            .iter()
            .filter(move |kp| kp.confidence > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 候補ごとの行から `[1, C, N]` を組み立てる
    fn tensor(rows: &[Vec<f32>]) -> Array3<f32> {
        let channels = rows[0].len();
        Array3::from_shape_fn((1, channels, rows.len()), |(_, c, n)| rows[n][c])
    }

    fn candidate(cx: f32, cy: f32, w: f32, h: f32, score: f32, kp_base: f32) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h, score];
        for i in 0..KeypointIndex::COUNT {
            row.push(kp_base + i as f32);
            row.push(kp_base + 100.0 + i as f32);
            row.push(0.9);
        }
        row
    }

    #[test]
    fn test_keypoint_count() {
        assert_eq!(keypoint_count(56), Ok(17));
        assert_eq!(keypoint_count(5), Ok(0));
        assert_eq!(keypoint_count(4), Err(DecodeError::ChannelCount(4)));
        assert_eq!(keypoint_count(57), Err(DecodeError::ChannelCount(57)));
    }

    #[test]
    fn test_best_candidate_first_max_wins() {
        assert_eq!(best_candidate([0.1, 0.8, 0.3, 0.8]), Some(1));
        assert_eq!(best_candidate([0.5]), Some(0));
        assert_eq!(best_candidate(Vec::<f32>::new()), None);
    }

    #[test]
    fn test_best_candidate_skips_nan() {
        assert_eq!(best_candidate([f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(best_candidate([f32::NAN, f32::NAN]), None);
    }

    #[test]
    fn test_decode_all_nan_scores() {
        let output = tensor(&[
            candidate(10.0, 10.0, 2.0, 2.0, f32::NAN, 0.0),
            candidate(20.0, 20.0, 2.0, 2.0, f32::NAN, 500.0),
        ]);
        assert_eq!(Detection::decode(output.view()), Err(DecodeError::NoCandidates));
    }

    #[test]
    fn test_decode_selects_highest_score() {
        let output = tensor(&[
            candidate(100.0, 100.0, 20.0, 40.0, 0.2, 0.0),
            candidate(320.0, 240.0, 100.0, 200.0, 0.9, 1000.0),
            candidate(50.0, 50.0, 10.0, 10.0, 0.4, 2000.0),
        ]);
        let det = Detection::decode(output.view()).unwrap();

        assert_eq!(det.score, 0.9);
        assert_eq!(det.bbox, BoundingBox::new(270.0, 140.0, 370.0, 340.0));
        assert_eq!(det.keypoints.len(), KeypointIndex::COUNT);

        let nose = det.keypoint(KeypointIndex::Nose).unwrap();
        assert_eq!(*nose, Keypoint::new(1000.0, 1100.0, 0.9));
        let right_wrist = det.keypoint(KeypointIndex::RightWrist).unwrap();
        assert_eq!(*right_wrist, Keypoint::new(1010.0, 1110.0, 0.9));
    }

    #[test]
    fn test_decode_tie_takes_first() {
        let output = tensor(&[
            candidate(10.0, 10.0, 2.0, 2.0, 0.7, 0.0),
            candidate(20.0, 20.0, 2.0, 2.0, 0.7, 500.0),
        ]);
        let det = Detection::decode(output.view()).unwrap();
        assert_eq!(det.bbox, BoundingBox::new(9.0, 9.0, 11.0, 11.0));
    }

    #[test]
    fn test_decode_low_score_still_returned() {
        let output = tensor(&[candidate(10.0, 10.0, 4.0, 4.0, 0.01, 0.0)]);
        let det = Detection::decode(output.view()).unwrap();
        assert_eq!(det.score, 0.01);
        assert!(!det.is_renderable(0.5));
    }

    #[test]
    fn test_decode_does_not_clamp() {
        let output = tensor(&[candidate(5.0, 5.0, 20.0, 20.0, 0.5, -50.0)]);
        let det = Detection::decode(output.view()).unwrap();
        assert_eq!(det.bbox, BoundingBox::new(-5.0, -5.0, 15.0, 15.0));
        assert_eq!(det.keypoints[0].x, -50.0);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let output = tensor(&[
            candidate(1.0, 2.0, 3.0, 4.0, 0.3, 0.0),
            candidate(5.0, 6.0, 7.0, 8.0, 0.6, 10.0),
        ]);
        let a = Detection::decode(output.view()).unwrap();
        let b = Detection::decode(output.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let empty = Array3::<f32>::zeros((1, 56, 0));
        assert_eq!(Detection::decode(empty.view()), Err(DecodeError::NoCandidates));

        let batched = Array3::<f32>::zeros((2, 56, 10));
        assert_eq!(Detection::decode(batched.view()), Err(DecodeError::BatchSize(2)));

        let odd = Array3::<f32>::zeros((1, 55, 10));
        assert_eq!(Detection::decode(odd.view()), Err(DecodeError::ChannelCount(55)));
    }

    #[test]
    fn test_decode_flat_matches_view() {
        let output = tensor(&[
            candidate(100.0, 100.0, 20.0, 40.0, 0.2, 0.0),
            candidate(320.0, 240.0, 100.0, 200.0, 0.9, 1000.0),
        ]);
        let flat: Vec<f32> = output.iter().copied().collect();
        let det = Detection::decode_flat(&flat, 56, 2).unwrap();
        assert_eq!(det, Detection::decode(output.view()).unwrap());
    }

    #[test]
    fn test_decode_flat_length_mismatch() {
        let data = vec![0.0; 100];
        assert_eq!(
            Detection::decode_flat(&data, 56, 2),
            Err(DecodeError::BufferLength { expected: 112, actual: 100 })
        );
    }

    #[test]
    fn test_decode_flat_size_overflow() {
        let data = vec![0.0; 56];
        assert_eq!(
            Detection::decode_flat(&data, 56, usize::MAX),
            Err(DecodeError::BufferLength { expected: usize::MAX, actual: 56 })
        );
    }

    #[test]
    fn test_visible_keypoints_strictly_above_threshold() {
        let det = Detection {
            bbox: BoundingBox::default(),
            score: 0.8,
            keypoints: vec![
                Keypoint::new(0.0, 0.0, 0.5),
                Keypoint::new(1.0, 1.0, 0.6),
                Keypoint::new(2.0, 2.0, 0.1),
            ],
        };
        let visible: Vec<_> = det.visible_keypoints(0.5).collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].x, 1.0);
    }

    #[test]
    fn test_bbox_mirrored() {
        let bbox = BoundingBox::new(10.0, 20.0, 110.0, 220.0);
        let m = bbox.mirrored(640.0);
        assert_eq!(m, BoundingBox::new(530.0, 20.0, 630.0, 220.0));
        assert_eq!(m.width(), bbox.width());
        assert_eq!(m.height(), 200.0);
    }
}
