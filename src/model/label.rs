// 该文件是 Chepai （车牌） 项目的一部分。
// src/model/label.rs - 类别标签表
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ModelLoadError;

/// 类别索引到字符（或类别名称）的映射
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LabelTable {
  labels: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("类别 {class_id} 在标签表中没有对应项（标签表共 {table_len} 项）")]
pub struct UnknownClassError {
  pub class_id: u32,
  pub table_len: usize,
}

impl LabelTable {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn glyph(&self, class_id: u32) -> Result<&str, UnknownClassError> {
    self
      .labels
      .get(class_id as usize)
      .map(String::as_str)
      .ok_or(UnknownClassError {
        class_id,
        table_len: self.labels.len(),
      })
  }
}

impl LabelTable {
  /// 字符表的每一项必须恰好是一个字符，车牌文本长度才等于字符框数
  pub fn ensure_single_glyphs(&self) -> Result<(), ModelLoadError> {
    match self
      .labels
      .iter()
      .enumerate()
      .find(|(_, label)| label.chars().count() != 1)
    {
      Some((class_id, label)) => Err(ModelLoadError::InvalidConfig(format!(
        "字符表第 {} 项 '{}' 不是单个字符",
        class_id, label
      ))),
      None => Ok(()),
    }
  }
}
