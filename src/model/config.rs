// 该文件是 Chepai （车牌） 项目的一部分。
// src/model/config.rs - 检测器配置
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  decode::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD},
  model::{LabelTable, ModelLoadError},
};

/// 与权重文件配套的检测器配置（JSON）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
  /// 网络输入宽度
  #[serde(default = "default_input_size")]
  pub input_width: u32,

  /// 网络输入高度
  #[serde(default = "default_input_size")]
  pub input_height: u32,

  /// 标签表，下标即类别索引
  pub labels: LabelTable,

  #[serde(default = "default_confidence")]
  pub confidence_threshold: f32,

  /// NMS IoU 阈值
  #[serde(default = "default_nms_threshold")]
  pub nms_threshold: f32,

  #[serde(default = "default_intra_threads")]
  pub intra_threads: usize,
}

fn default_input_size() -> u32 {
  416
}

fn default_confidence() -> f32 {
  DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_nms_threshold() -> f32 {
  DEFAULT_NMS_THRESHOLD
}

fn default_intra_threads() -> usize {
  1
}

impl DetectorConfig {
  pub fn new(labels: LabelTable) -> Self {
    Self {
      input_width: default_input_size(),
      input_height: default_input_size(),
      labels,
      confidence_threshold: default_confidence(),
      nms_threshold: default_nms_threshold(),
      intra_threads: default_intra_threads(),
    }
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config: DetectorConfig =
      serde_json::from_str(&contents).map_err(|source| ModelLoadError::Config {
        path: path.to_path_buf(),
        source,
      })?;
    config.validate()?;
    debug!(
      "检测器配置: 输入 {}x{}, 类别数 {}, 置信度阈值 {}, NMS 阈值 {}",
      config.input_width,
      config.input_height,
      config.labels.len(),
      config.confidence_threshold,
      config.nms_threshold
    );
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ModelLoadError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ModelLoadError::InvalidConfig(format!(
        "输入尺寸不能为 0: {}x{}",
        self.input_width, self.input_height
      )));
    }
    if self.labels.is_empty() {
      return Err(ModelLoadError::InvalidConfig("标签表为空".to_string()));
    }
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ModelLoadError::InvalidConfig(format!(
        "置信度阈值超出范围 [0, 1]: {}",
        self.confidence_threshold
      )));
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(ModelLoadError::InvalidConfig(format!(
        "NMS 阈值超出范围 [0, 1]: {}",
        self.nms_threshold
      )));
    }
    Ok(())
  }

  /// 每个预测向量的长度: 4 个坐标 + objectness + 各类别概率
  pub fn feature_width(&self) -> usize {
    5 + self.labels.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let config: DetectorConfig = serde_json::from_str(r#"{ "labels": ["plate"] }"#).unwrap();
    assert_eq!(config.input_width, 416);
    assert_eq!(config.input_height, 416);
    assert_eq!(config.confidence_threshold, 0.3);
    assert_eq!(config.nms_threshold, 0.4);
    assert_eq!(config.feature_width(), 6);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn rejects_out_of_range_threshold() {
    let mut config = DetectorConfig::new(LabelTable::new(["plate"]));
    config.confidence_threshold = 1.5;
    assert!(matches!(
      config.validate(),
      Err(ModelLoadError::InvalidConfig(_))
    ));
  }

  #[test]
  fn rejects_empty_labels() {
    let config = DetectorConfig::new(LabelTable::default());
    assert!(matches!(
      config.validate(),
      Err(ModelLoadError::InvalidConfig(_))
    ));
  }

  #[test]
  fn missing_file_is_a_load_error() {
    let result = DetectorConfig::from_file("/nonexistent/chepai/plate.json");
    assert!(matches!(result, Err(ModelLoadError::Io { .. })));
  }

  #[test]
  fn corrupt_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ labels: ").unwrap();
    let result = DetectorConfig::from_file(&path);
    assert!(matches!(result, Err(ModelLoadError::Config { .. })));
  }
}
