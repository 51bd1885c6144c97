// 该文件是 Chepai （车牌） 项目的一部分。
// src/output/artifact_directory.rs - 识别产物目录
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

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  assemble::CharacterBox,
  character::RecognitionMode,
  model::BoundingBox,
  output::Render,
  pipeline::Recognition,
  url_to_path,
};

pub const CAR_BOX_FILE: &str = "car_box.jpg";
pub const PLATE_BOX_FILE: &str = "plate_box.jpg";
pub const PLATE_SEGMENTED_FILE: &str = "plate_segmented.jpg";
pub const RESULT_FILE: &str = "result.json";

#[derive(Error, Debug)]
pub enum ArtifactOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("图像保存错误 {path}: {source}")]
  Image {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("结果序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 写入 `result.json` 的识别报告
#[derive(Debug, Serialize)]
pub struct Report<'a> {
  pub source: String,
  pub timestamp: String,
  pub mode: RecognitionMode,
  pub plate: Option<BoundingBox>,
  pub characters: &'a [CharacterBox],
  pub text: &'a str,
  pub rows: usize,
}

impl<'a> Report<'a> {
  pub fn new(source: &Path, recognition: &'a Recognition) -> Self {
    Report {
      source: source.display().to_string(),
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      mode: recognition.mode,
      plate: recognition.plate.as_ref().map(|plate| plate.bbox),
      characters: &recognition.result.characters,
      text: &recognition.result.text,
      rows: recognition.result.rows,
    }
  }
}

/// 将一次识别的图像与报告写入目录
#[derive(Debug, Clone)]
pub struct ArtifactDirectory {
  directory: PathBuf,
}

impl FromUrlWithScheme for ArtifactDirectory {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ArtifactDirectory {
  type Error = ArtifactOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ArtifactOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(url_to_path(uri)))
  }
}

impl ArtifactDirectory {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 子目录，批量处理时每张图像一个
  pub fn join(&self, name: impl AsRef<Path>) -> Self {
    Self::new(self.directory.join(name))
  }

  pub fn write(&self, source: &Path, recognition: &Recognition) -> Result<(), ArtifactOutputError> {
    std::fs::create_dir_all(&self.directory).map_err(|source| ArtifactOutputError::Io {
      path: self.directory.clone(),
      source,
    })?;

    match &recognition.plate {
      Some(plate) => {
        self.save_image(CAR_BOX_FILE, &recognition.annotated)?;
        self.save_image(PLATE_BOX_FILE, &plate.image)?;
        match &recognition.segmented {
          Some(segmented) => self.save_image(PLATE_SEGMENTED_FILE, segmented)?,
          None => self.remove_stale(PLATE_SEGMENTED_FILE)?,
        }
      }
      None => {
        for name in [CAR_BOX_FILE, PLATE_BOX_FILE, PLATE_SEGMENTED_FILE] {
          self.remove_stale(name)?;
        }
      }
    }

    let path = self.directory.join(RESULT_FILE);
    let report = serde_json::to_string_pretty(&Report::new(source, recognition))?;
    std::fs::write(&path, report).map_err(|source| ArtifactOutputError::Io { path, source })?;

    info!("识别结果已写入: {}", self.directory.display());
    Ok(())
  }

  /// 删除上一次运行留下的图像，文件不存在时忽略
  fn remove_stale(&self, name: &str) -> Result<(), ArtifactOutputError> {
    let path = self.directory.join(name);
    match std::fs::remove_file(&path) {
      Ok(()) => {
        debug!("删除过期产物: {}", path.display());
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(ArtifactOutputError::Io { path, source }),
    }
  }

  fn save_image(&self, name: &str, image: &image::RgbImage) -> Result<(), ArtifactOutputError> {
    let path = self.directory.join(name);
    image
      .save(&path)
      .map_err(|source| ArtifactOutputError::Image { path, source })
  }
}

impl Render<Path, Recognition> for ArtifactDirectory {
  type Error = ArtifactOutputError;

  fn render_result(&self, source: &Path, result: &Recognition) -> Result<(), Self::Error> {
    self.write(source, result)
  }
}
