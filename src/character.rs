// 该文件是 Chepai （车牌） 项目的一部分。
// src/character.rs - 字符定位与识别模式
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
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  detect::{DetectError, Detection},
  model::{DetectionSet, InferenceError, Model, RawOutputs},
};

/// 字符识别后端的统一接口
pub trait CharacterRecognizer {
  fn localize_characters(&self, plate: &RgbImage) -> Result<DetectionSet, DetectError>;
}

/// 用专门训练的字符检测网络在车牌图像上定位字符
pub struct CharacterLocalizer<M> {
  detection: Detection<M>,
}

impl<M> CharacterLocalizer<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  pub fn new(detection: Detection<M>) -> Self {
    Self { detection }
  }

  pub fn with_confidence_threshold(mut self, confidence_threshold: f32) -> Self {
    self.detection = self.detection.with_confidence_threshold(confidence_threshold);
    self
  }

  pub fn detection(&self) -> &Detection<M> {
    &self.detection
  }

  pub fn localize(&self, plate: &RgbImage) -> Result<DetectionSet, DetectError> {
    let detections = self.detection.detect(plate)?;
    if detections.is_empty() {
      warn!("车牌上未检测到字符");
    } else {
      info!("车牌上检测到 {} 个字符", detections.len());
    }
    Ok(detections)
  }
}

impl<M> CharacterRecognizer for CharacterLocalizer<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  fn localize_characters(&self, plate: &RgbImage) -> Result<DetectionSet, DetectError> {
    self.localize(plate)
  }
}

/// 识别模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionMode {
  /// 自训练的字符检测网络
  #[default]
  Trained,
}

impl std::fmt::Display for RecognitionMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RecognitionMode::Trained => write!(f, "trained"),
    }
  }
}

pub enum RecognizerWrapper<M> {
  Trained(CharacterLocalizer<M>),
}

impl<M> RecognizerWrapper<M> {
  pub fn mode(&self) -> RecognitionMode {
    match self {
      RecognizerWrapper::Trained(_) => RecognitionMode::Trained,
    }
  }
}

impl<M> RecognizerWrapper<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  pub fn with_mode(mode: RecognitionMode, detection: Detection<M>) -> Self {
    match mode {
      RecognitionMode::Trained => RecognizerWrapper::Trained(CharacterLocalizer::new(detection)),
    }
  }

  pub fn with_confidence_threshold(self, confidence_threshold: f32) -> Self {
    match self {
      RecognizerWrapper::Trained(localizer) => {
        RecognizerWrapper::Trained(localizer.with_confidence_threshold(confidence_threshold))
      }
    }
  }
}

impl<M> CharacterRecognizer for RecognizerWrapper<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  fn localize_characters(&self, plate: &RgbImage) -> Result<DetectionSet, DetectError> {
    match self {
      RecognizerWrapper::Trained(localizer) => localizer.localize_characters(plate),
    }
  }
}
