use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{self, Mat, Scalar, Size, CV_32FC3},
    imgproc,
    prelude::*,
};

use super::letterbox::LetterboxTransform;

/// BGR フレームをレターボックス処理して YOLOv8 入力テンソルに変換
///
/// - 黒帯で正方形にパディング (`LetterboxTransform` 参照)
/// - BGR -> RGB
/// - `model_size` x `model_size` にリサイズ
/// - NCHW [1, 3, model_size, model_size] の f32 (0.0-1.0) に変換
pub fn letterbox_frame(frame: &Mat, model_size: i32) -> Result<(Array4<f32>, LetterboxTransform)> {
    let transform =
        LetterboxTransform::new(frame.cols() as u32, frame.rows() as u32, model_size as u32)?;
    let pad = transform.padding();

    let mut padded = Mat::default();
    core::copy_make_border(
        frame,
        &mut padded,
        pad.top as i32,
        pad.bottom as i32,
        pad.left as i32,
        pad.right as i32,
        core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(&padded, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(model_size, model_size),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0 / 255.0, 0.0)?;

    let s = model_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..model_size {
        for x in 0..model_size {
            let pixel = float_mat.at_2d::<core::Vec3f>(y, x)?;
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c];
            }
        }
    }

    Ok((tensor, transform))
}
