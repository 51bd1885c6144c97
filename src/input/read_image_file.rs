// 该文件是 Chepai （车牌） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_to_path};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageLoadError {
  #[error("URI schema mismatch: expected '{expected}', found '{found}'")]
  SchemaMismatch { expected: &'static str, found: String },
  #[error("I/O error {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Image decoding error {path}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("Unsupported image format: {0}")]
  Unsupported(PathBuf),
}

/// 从文件读取并解码的 RGB 图像
pub struct ImageFileInput {
  path: PathBuf,
  image: RgbImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageLoadError::SchemaMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    Self::open(url_to_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageLoadError> {
    let path = path.as_ref();
    if !is_supported_image(path) {
      return Err(ImageLoadError::Unsupported(path.to_path_buf()));
    }

    let image = ImageReader::open(path)
      .map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
      })?
      .with_guessed_format()
      .map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
      })?
      .decode()
      .map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
      })?
      .to_rgb8();

    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(Self {
      path: path.to_path_buf(),
      image,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }
}

/// 按扩展名判断是否为支持的图像（jpg/jpeg/png）
pub fn is_supported_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
    })
    .unwrap_or(false)
}

/// 列出目录下所有支持的图像文件，按文件名排序
pub fn collect_images(directory: impl AsRef<Path>) -> Result<Vec<PathBuf>, ImageLoadError> {
  let directory = directory.as_ref();
  let entries = std::fs::read_dir(directory).map_err(|source| ImageLoadError::Io {
    path: directory.to_path_buf(),
    source,
  })?;

  let mut images = Vec::new();
  for entry in entries {
    let path = entry
      .map_err(|source| ImageLoadError::Io {
        path: directory.to_path_buf(),
        source,
      })?
      .path();
    if path.is_file() && is_supported_image(&path) {
      images.push(path);
    }
  }
  images.sort();
  Ok(images)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn opens_png_from_path_and_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("car one.png");
    RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&path).unwrap();

    let input = ImageFileInput::open(&path).unwrap();
    assert_eq!((input.width(), input.height()), (8, 6));
    assert_eq!(*input.image().get_pixel(0, 0), Rgb([1, 2, 3]));

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file://", "image://", 1)).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.path(), path.as_path());
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let result = ImageFileInput::open("/nonexistent/chepai/car.jpg");
    assert!(matches!(result, Err(ImageLoadError::Io { .. })));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"definitely not a jpeg").unwrap();
    let result = ImageFileInput::open(&path);
    assert!(matches!(result, Err(ImageLoadError::Decode { .. })));
  }

  #[test]
  fn unsupported_extension_is_rejected() {
    let result = ImageFileInput::open("/tmp/car.gif");
    assert!(matches!(result, Err(ImageLoadError::Unsupported(_))));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("video:///tmp/car.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageLoadError::SchemaMismatch { .. })
    ));
  }

  #[test]
  fn collects_only_images_in_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    let images = collect_images(dir.path()).unwrap();
    let names: Vec<_> = images
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["a.JPG", "b.png", "c.jpeg"]);
  }
}
