// 该文件是 Chepai （车牌） 项目的一部分。
// src/model.rs - 模型
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

use std::path::PathBuf;

use ndarray::ArrayD;
use serde::Serialize;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 网络的原始输出，每个张量的最后一维为 `[cx, cy, w, h, objectness, p_0, ...]`
#[derive(Debug, Clone, Default)]
pub struct RawOutputs {
  pub tensors: Vec<ArrayD<f32>>,
}

impl RawOutputs {
  pub fn is_empty(&self) -> bool {
    self.tensors.iter().all(|t| t.is_empty())
  }
}

impl From<Vec<ArrayD<f32>>> for RawOutputs {
  fn from(tensors: Vec<ArrayD<f32>>) -> Self {
    Self { tensors }
  }
}

/// 图像上的检测框，坐标为绝对像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
  pub confidence: f32,
  pub class_id: u32,
}

impl BoundingBox {
  pub fn right(&self) -> u32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> u32 {
    self.y + self.height
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  pub fn center_x(&self) -> f32 {
    self.x as f32 + self.width as f32 / 2.0
  }

  pub fn center_y(&self) -> f32 {
    self.y as f32 + self.height as f32 / 2.0
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let intersection = if x2 > x1 && y2 > y1 {
      (x2 - x1) as f32 * (y2 - y1) as f32
    } else {
      0.0
    };
    let union = self.area() as f32 + other.area() as f32 - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 一次推理得到的检测结果
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
  pub items: Box<[BoundingBox]>,
}

impl DetectionSet {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
    self.items.iter()
  }
}

impl From<Vec<BoundingBox>> for DetectionSet {
  fn from(items: Vec<BoundingBox>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型文件读取错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型配置解析错误 {path}: {source}")]
  Config {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("模型配置无效: {0}")]
  InvalidConfig(String),
  #[error("模型结构不匹配: {0}")]
  ArchitectureMismatch(String),
  #[error("推理运行时错误（{stage}）: {message}")]
  Runtime { stage: &'static str, message: String },
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl ModelLoadError {
  pub fn runtime(stage: &'static str, e: impl std::fmt::Display) -> Self {
    ModelLoadError::Runtime {
      stage,
      message: e.to_string(),
    }
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理运行时错误（{stage}）: {message}")]
  Runtime { stage: &'static str, message: String },
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
  #[error("输出张量形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
}

impl InferenceError {
  pub fn runtime(stage: &'static str, e: impl std::fmt::Display) -> Self {
    InferenceError::Runtime {
      stage,
      message: e.to_string(),
    }
  }
}

mod config;
mod label;
pub use self::config::DetectorConfig;
pub use self::label::{LabelTable, UnknownClassError};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{YoloDetector, YoloDetectorBuilder};
