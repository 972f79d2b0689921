use anyhow::{Context, Result};
use ndarray::{Array3, Array4, Ix3};
use opencv::core::Mat;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::detection::Detection;
use super::preprocess::letterbox_frame;

/// YOLOv8-pose ONNX モデル
pub struct PoseModel {
    session: Session,
    input_size: i32,
}

impl PoseModel {
    /// モデル読み込み後、ウォームアップ推論を1回実行
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: i32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load pose ONNX model")?;

        let mut model = Self {
            session,
            input_size,
        };
        model.warm_up()?;
        Ok(model)
    }

    pub fn input_size(&self) -> i32 {
        self.input_size
    }

    fn warm_up(&mut self) -> Result<()> {
        let s = self.input_size as usize;
        self.infer(Array4::<f32>::zeros((1, 3, s, s)))
            .context("Warm-up inference failed")?;
        log::debug!("pose model warmed up at {}x{}", s, s);
        Ok(())
    }

    /// 推論を実行
    ///
    /// 入力: [1, 3, M, M] f32 テンソル
    /// 出力: [1, 56, N] (cx, cy, w, h, score, 17 x (x, y, confidence))
    pub fn infer(&mut self, input: Array4<f32>) -> Result<Array3<f32>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input_tensor])
            .context("Pose inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs["output0"]
            .try_extract_array()
            .context("Failed to extract pose output tensor")?;
        let output = output
            .into_dimensionality::<Ix3>()
            .context("Pose output is not rank 3")?;

        Ok(output.to_owned())
    }

    /// BGR フレームから最良の検出結果を返す (フレームのピクセル座標)
    pub fn detect(&mut self, frame: &Mat) -> Result<Detection> {
        let (input, transform) = letterbox_frame(frame, self.input_size)?;
        let output = self.infer(input)?;
        let detection = Detection::decode(output.view())?;
        Ok(detection.remap(&transform))
    }
}
