// 该文件是 Chepai （车牌） 项目的一部分。
// src/frame.rs - NCHW 帧定义
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

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;

const RGB_CHANNELS: usize = 3;

/// 归一化到 [0, 1] 的 RGB 浮点张量，形状为 `[1, 3, H, W]`
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Array4<f32>,
}

impl RgbNchwFrame {
  /// 将图像缩放到网络输入尺寸并转换为 NCHW 布局
  pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let resized;
    let source = if image.dimensions() == (width, height) {
      image
    } else {
      resized = image::imageops::resize(image, width, height, FilterType::Triangle);
      &resized
    };

    let mut data = Array4::<f32>::zeros((1, RGB_CHANNELS, height as usize, width as usize));
    for (x, y, pixel) in source.enumerate_pixels() {
      for c in 0..RGB_CHANNELS {
        data[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
      }
    }

    Self { data }
  }

  pub fn height(&self) -> usize {
    self.data.shape()[2]
  }

  pub fn width(&self) -> usize {
    self.data.shape()[3]
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }
}
