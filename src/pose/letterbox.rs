use serde::{Deserialize, Serialize};

use super::detection::{BoundingBox, Detection};
use super::keypoint::Keypoint;
use crate::error::TransformError;

/// 元フレームを正方形にパディングしてモデル入力サイズへ縮小した変換
///
/// `S = max(width, height)` の正方形にパディングし (左/上は余白の半分を切り捨て、
/// 残りを右/下)、`S x S` を `M x M` にリサイズする
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterboxTransform {
    /// モデル座標 → パディング後座標の倍率 (S / M)
    pub scale: f64,
    /// 左パディング (元フレームのピクセル)
    pub x_offset: f64,
    /// 上パディング (元フレームのピクセル)
    pub y_offset: f64,
    pub original_width: u32,
    pub original_height: u32,
}

/// 各辺のパディング (元フレームのピクセル)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl LetterboxTransform {
    pub fn new(width: u32, height: u32, model_size: u32) -> Result<Self, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyFrame { width, height });
        }
        if model_size == 0 {
            return Err(TransformError::EmptyModelInput);
        }

        let square = width.max(height);
        Ok(Self {
            scale: square as f64 / model_size as f64,
            x_offset: ((square - width) / 2) as f64,
            y_offset: ((square - height) / 2) as f64,
            original_width: width,
            original_height: height,
        })
    }

    /// パディング後の正方形の一辺
    pub fn square_size(&self) -> u32 {
        self.original_width.max(self.original_height)
    }

    pub fn padding(&self) -> Padding {
        let square = self.square_size();
        let pad_w = square - self.original_width;
        let pad_h = square - self.original_height;
        Padding {
            left: pad_w / 2,
            right: pad_w - pad_w / 2,
            top: pad_h / 2,
            bottom: pad_h - pad_h / 2,
        }
    }

    /// 元 x → モデル x
    pub fn x_to_model(&self, x: f64) -> f64 {
        (x + self.x_offset) / self.scale
    }

    /// 元 y → モデル y
    pub fn y_to_model(&self, y: f64) -> f64 {
        (y + self.y_offset) / self.scale
    }

    /// モデル x → 元 x
    pub fn x_to_source(&self, x: f64) -> f64 {
        x * self.scale - self.x_offset
    }

    /// モデル y → 元 y
    pub fn y_to_source(&self, y: f64) -> f64 {
        y * self.scale - self.y_offset
    }

    fn keypoint_to_source(&self, kp: &Keypoint) -> Keypoint {
        Keypoint {
            x: self.x_to_source(kp.x as f64) as f32,
            y: self.y_to_source(kp.y as f64) as f32,
            confidence: kp.confidence,
        }
    }

    fn bbox_to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x_to_source(bbox.x1 as f64) as f32,
            y1: self.y_to_source(bbox.y1 as f64) as f32,
            x2: self.x_to_source(bbox.x2 as f64) as f32,
            y2: self.y_to_source(bbox.y2 as f64) as f32,
        }
    }
}

impl Detection {
    /// バウンディングボックスとキーポイントをモデル座標から元フレーム座標に戻す。
    /// スコアと信頼度はそのまま
    pub fn remap(&self, transform: &LetterboxTransform) -> Detection {
        Detection {
            bbox: transform.bbox_to_source(&self.bbox),
            score: self.score,
            keypoints: self
                .keypoints
                .iter()
                .map(|kp| transform.keypoint_to_source(kp))
                .collect(),
        }
    }
}
