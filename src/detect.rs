// 该文件是 Chepai （车牌） 项目的一部分。
// src/detect.rs - 推理与解码组合
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  decode::{BoxDecoder, DEFAULT_CONFIDENCE_THRESHOLD, DecodeError},
  model::{DetectionSet, InferenceError, Model, RawOutputs},
};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
}

/// 一个检测网络加上它的解码参数
pub struct Detection<M> {
  model: M,
  decoder: BoxDecoder,
  confidence_threshold: f32,
}

impl<M> Detection<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  pub fn new(model: M) -> Self {
    Self {
      model,
      decoder: BoxDecoder::default(),
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
    }
  }

  pub fn with_decoder(mut self, decoder: BoxDecoder) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn with_confidence_threshold(mut self, confidence_threshold: f32) -> Self {
    self.confidence_threshold = confidence_threshold;
    self
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn detect(&self, image: &RgbImage) -> Result<DetectionSet, DetectError> {
    let now = std::time::Instant::now();
    let raw = self.model.infer(image)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let detections = self.decoder.decode(
      &raw,
      image.width(),
      image.height(),
      self.confidence_threshold,
    )?;
    Ok(detections)
  }
}

#[cfg(feature = "model_onnx")]
impl From<crate::model::YoloDetector> for Detection<crate::model::YoloDetector> {
  /// 阈值取自检测器的配置文件
  fn from(model: crate::model::YoloDetector) -> Self {
    let decoder = BoxDecoder::new(model.config().nms_threshold);
    let confidence_threshold = model.config().confidence_threshold;
    Self {
      model,
      decoder,
      confidence_threshold,
    }
  }
}
