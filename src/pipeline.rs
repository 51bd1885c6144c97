// 该文件是 Chepai （车牌） 项目的一部分。
// src/pipeline.rs - 两阶段识别流水线
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  assemble::{PlateAssembler, PlateResult},
  character::{CharacterRecognizer, RecognitionMode, RecognizerWrapper},
  detect::DetectError,
  input::{ImageFileInput, ImageLoadError},
  model::{InferenceError, LabelTable, Model, RawOutputs, UnknownClassError},
  output::draw::Draw,
  plate::{PlateCandidate, PlateLocalizer},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像加载错误: {0}")]
  ImageLoad(#[from] ImageLoadError),
  #[error("检测错误: {0}")]
  Detect(#[from] DetectError),
  #[error("标签表与模型不一致: {0}")]
  UnknownClass(#[from] UnknownClassError),
}

/// 一次识别的全部产物
#[derive(Debug, Clone)]
pub struct Recognition {
  /// 标注了车牌框的整车图像，未检测到车牌时与输入相同
  pub annotated: RgbImage,
  pub plate: Option<PlateCandidate>,
  pub result: PlateResult,
  /// 标注了字符框的车牌图像
  pub segmented: Option<RgbImage>,
  pub mode: RecognitionMode,
}

impl Recognition {
  pub fn text(&self) -> &str {
    &self.result.text
  }
}

/// 流水线上下文，持有两个检测网络和字符标签表
pub struct PipelineContext<M> {
  plate: PlateLocalizer<M>,
  recognizer: RecognizerWrapper<M>,
  assembler: PlateAssembler,
  labels: LabelTable,
}

impl<M> PipelineContext<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  pub fn new(
    plate: PlateLocalizer<M>,
    recognizer: RecognizerWrapper<M>,
    labels: LabelTable,
  ) -> Self {
    Self {
      plate,
      recognizer,
      assembler: PlateAssembler::default(),
      labels,
    }
  }

  pub fn with_assembler(mut self, assembler: PlateAssembler) -> Self {
    self.assembler = assembler;
    self
  }

  /// 车牌图像与字符图像使用同一套绘制参数
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.plate = self.plate.with_draw(draw.clone());
    self.assembler = self.assembler.with_draw(draw);
    self
  }

  pub fn with_plate_threshold(mut self, confidence_threshold: f32) -> Self {
    self.plate = self.plate.with_confidence_threshold(confidence_threshold);
    self
  }

  pub fn with_char_threshold(mut self, confidence_threshold: f32) -> Self {
    self.recognizer = self.recognizer.with_confidence_threshold(confidence_threshold);
    self
  }

  pub fn mode(&self) -> RecognitionMode {
    self.recognizer.mode()
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn plate_localizer(&self) -> &PlateLocalizer<M> {
    &self.plate
  }

  pub fn recognizer(&self) -> &RecognizerWrapper<M> {
    &self.recognizer
  }

  pub fn run(&self, image: &RgbImage) -> Result<Recognition, PipelineError> {
    let mode = self.mode();
    let now = std::time::Instant::now();
    let (plate, annotated) = self.plate.localize(image)?;
    info!("车牌定位完成，耗时: {:.2?}", now.elapsed());

    let Some(plate) = plate else {
      return Ok(Recognition {
        annotated,
        plate: None,
        result: PlateResult::default(),
        segmented: None,
        mode,
      });
    };

    let now = std::time::Instant::now();
    let characters = self.recognizer.localize_characters(&plate.image)?;
    info!("字符定位完成，耗时: {:.2?}", now.elapsed());

    let (result, segmented) = self
      .assembler
      .assemble(&plate.image, &characters.items, &self.labels)?;
    if result.is_empty() {
      warn!("车牌无法识别");
    } else {
      info!("识别结果: {}", result.text);
    }

    Ok(Recognition {
      annotated,
      plate: Some(plate),
      result,
      segmented: Some(segmented),
      mode,
    })
  }

  pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Recognition, PipelineError> {
    let input = ImageFileInput::open(path)?;
    self.run(input.image())
  }
}

#[cfg(feature = "model_onnx")]
mod onnx {
  use tracing::info;

  use super::PipelineContext;
  use crate::{
    FromUrl,
    character::{RecognitionMode, RecognizerWrapper},
    detect::Detection,
    model::{ModelLoadError, YoloDetector, YoloDetectorBuilder},
    plate::PlateLocalizer,
  };

  impl PipelineContext<YoloDetector> {
    /// 从两个模型 URL 加载整个流水线，任一模型失败都中止
    pub fn load(
      plate_model: &url::Url,
      char_model: &url::Url,
      mode: RecognitionMode,
    ) -> Result<Self, ModelLoadError> {
      info!("加载车牌检测模型: {}", plate_model);
      let plate = YoloDetectorBuilder::from_url(plate_model)?.build()?;
      info!("加载字符检测模型: {}", char_model);
      let chars = YoloDetectorBuilder::from_url(char_model)?.build()?;
      let labels = chars.config().labels.clone();
      labels.ensure_single_glyphs()?;

      Ok(Self::new(
        PlateLocalizer::new(Detection::from(plate)),
        RecognizerWrapper::with_mode(mode, Detection::from(chars)),
        labels,
      ))
    }
  }
}
