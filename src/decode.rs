// 该文件是 Chepai （车牌） 项目的一部分。
// src/decode.rs - 检测框解码与非极大值抑制
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

use std::collections::BTreeMap;

use ndarray::ArrayView1;
use thiserror::Error;
use tracing::debug;

use crate::model::{BoundingBox, DetectionSet, RawOutputs};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

// cx, cy, w, h, objectness
const BOX_FIELDS: usize = 5;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("预测向量长度 {0} 过短，至少需要 {min}", min = BOX_FIELDS + 1)]
  FeatureWidth(usize),
  #[error("输出张量 {index} 无法展开为预测矩阵: {message}")]
  MalformedOutput { index: usize, message: String },
}

/// 将网络原始输出解码为图像上的检测框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDecoder {
  nms_threshold: f32,
}

impl Default for BoxDecoder {
  fn default() -> Self {
    Self::new(DEFAULT_NMS_THRESHOLD)
  }
}

impl BoxDecoder {
  pub fn new(nms_threshold: f32) -> Self {
    Self { nms_threshold }
  }

  pub fn nms_threshold(&self) -> f32 {
    self.nms_threshold
  }

  /// 解码、过滤并按类别做 NMS，结果按置信度降序排列
  pub fn decode(
    &self,
    raw: &RawOutputs,
    image_width: u32,
    image_height: u32,
    confidence_threshold: f32,
  ) -> Result<DetectionSet, DecodeError> {
    if image_width == 0 || image_height == 0 {
      return Ok(DetectionSet::default());
    }

    let mut candidates = Vec::new();
    for (index, tensor) in raw.tensors.iter().enumerate() {
      if tensor.is_empty() {
        continue;
      }

      let features = tensor.shape().last().copied().unwrap_or(0);
      if features <= BOX_FIELDS {
        return Err(DecodeError::FeatureWidth(features));
      }

      let rows = tensor.len() / features;
      let matrix = tensor
        .to_shape((rows, features))
        .map_err(|e| DecodeError::MalformedOutput {
          index,
          message: e.to_string(),
        })?;

      candidates.extend(
        matrix
          .outer_iter()
          .filter_map(|row| decode_row(row, image_width, image_height, confidence_threshold)),
      );
    }

    debug!("置信度过滤后剩余 {} 个候选框", candidates.len());
    let kept = self.nms(candidates);
    debug!("NMS 后剩余 {} 个检测框", kept.len());

    Ok(DetectionSet::from(kept))
  }

  /// 按类别分组的非极大值抑制
  pub fn nms(&self, candidates: Vec<BoundingBox>) -> Vec<BoundingBox> {
    let mut groups: BTreeMap<u32, Vec<BoundingBox>> = BTreeMap::new();
    for candidate in candidates {
      groups.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::new();
    for (_, mut group) in groups {
      // 按置信度降序排序
      group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

      while !group.is_empty() {
        let best = group.remove(0);
        group.retain(|other| best.iou(other) <= self.nms_threshold);
        kept.push(best);
      }
    }

    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept
  }
}

/// 解码单个预测向量，坐标裁剪到图像范围内，面积为零或低于阈值时返回 None
fn decode_row(
  row: ArrayView1<f32>,
  image_width: u32,
  image_height: u32,
  confidence_threshold: f32,
) -> Option<BoundingBox> {
  let objectness = row[4];
  let (class_id, confidence) = row
    .iter()
    .skip(BOX_FIELDS)
    .enumerate()
    .map(|(class_id, p)| (class_id, objectness * p))
    .fold((0usize, f32::MIN), |best, current| {
      if current.1 > best.1 { current } else { best }
    });

  // NaN 也在这里被过滤
  if !(confidence >= confidence_threshold) {
    return None;
  }

  let (w_img, h_img) = (image_width as f32, image_height as f32);
  let cx = row[0] * w_img;
  let cy = row[1] * h_img;
  let w = row[2] * w_img;
  let h = row[3] * h_img;
  if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
    return None;
  }

  let left = (cx - w / 2.0).floor().max(0.0);
  let top = (cy - h / 2.0).floor().max(0.0);
  let right = (cx + w / 2.0).ceil().min(w_img);
  let bottom = (cy + h / 2.0).ceil().min(h_img);

  if right <= left || bottom <= top {
    return None;
  }

  Some(BoundingBox {
    x: left as u32,
    y: top as u32,
    width: (right - left) as u32,
    height: (bottom - top) as u32,
    confidence,
    class_id: class_id as u32,
  })
}
