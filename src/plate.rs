// 该文件是 Chepai （车牌） 项目的一部分。
// src/plate.rs - 车牌定位
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
use tracing::{info, warn};

use crate::{
  detect::{DetectError, Detection},
  model::{BoundingBox, DetectionSet, InferenceError, Model, RawOutputs},
  output::draw::Draw,
};

const PLATE_LABEL: &str = "plate";

/// 选中的车牌框及其裁剪图像
#[derive(Debug, Clone)]
pub struct PlateCandidate {
  pub bbox: BoundingBox,
  pub image: RgbImage,
}

pub struct PlateLocalizer<M> {
  detection: Detection<M>,
  draw: Draw,
}

impl<M> PlateLocalizer<M>
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  pub fn new(detection: Detection<M>) -> Self {
    Self {
      detection,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_confidence_threshold(mut self, confidence_threshold: f32) -> Self {
    self.detection = self.detection.with_confidence_threshold(confidence_threshold);
    self
  }

  pub fn detection(&self) -> &Detection<M> {
    &self.detection
  }

  /// 定位车牌，返回候选车牌（可能没有）与标注后的整车图像
  pub fn localize(
    &self,
    image: &RgbImage,
  ) -> Result<(Option<PlateCandidate>, RgbImage), DetectError> {
    let detections = self.detection.detect(image)?;

    let Some(bbox) = select_plate(&detections) else {
      warn!("未检测到车牌");
      return Ok((None, image.clone()));
    };

    info!(
      "检测到 {} 个车牌候选, 选中 ({}, {}, {}x{}) 置信度 {:.2}",
      detections.len(),
      bbox.x,
      bbox.y,
      bbox.width,
      bbox.height,
      bbox.confidence
    );

    let plate = crop(image, &bbox);
    let mut annotated = image.clone();
    self.draw.draw_plate(&mut annotated, &bbox, PLATE_LABEL);

    Ok((Some(PlateCandidate { bbox, image: plate }), annotated))
  }
}

/// 选出置信度最高的框，置信度相同时取面积较大者，再相同时取先出现者
pub fn select_plate(detections: &DetectionSet) -> Option<BoundingBox> {
  let mut best: Option<BoundingBox> = None;
  for candidate in detections.iter() {
    best = match best {
      Some(current)
        if candidate.confidence > current.confidence
          || (candidate.confidence == current.confidence && candidate.area() > current.area()) =>
      {
        Some(*candidate)
      }
      Some(current) => Some(current),
      None => Some(*candidate),
    };
  }
  best
}

/// 按检测框裁剪出新图像，原图不变
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
  image::imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}
