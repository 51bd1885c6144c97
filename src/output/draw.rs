// 该文件是 Chepai （车牌） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{info, warn};

use crate::{assemble::CharacterBox, model::BoundingBox};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PLATE_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const PALETTE_SIZE: usize = 36;

// 默认字体 DejaVu Sans Mono Bold，许可见 assets/FONT-LICENSE
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum FontLoadError {
  #[error("字体文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  Invalid(#[from] ab_glyph::InvalidFont),
}

/// 在图像上绘制检测框与标签
///
/// 默认使用内嵌字体；调用 `without_font` 后只绘制边框。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_vertical_padding: i32,
  plate_color: Rgb<u8>,
  palette: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个字符类别一个颜色，沿色相环均匀取色
    let palette = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    let font = FontArc::try_from_slice(DEFAULT_FONT)
      .map_err(|e| warn!("内嵌字体无效, 只绘制边框: {}", e))
      .ok();

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      plate_color: Rgb(PLATE_COLOR),
      palette,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn without_font(mut self) -> Self {
    self.font = None;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, FontLoadError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let data = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(data)?)
  }

  pub fn class_color(&self, class_id: u32) -> Rgb<u8> {
    self.palette[class_id as usize % self.palette.len()]
  }

  /// 绘制车牌框，标签为类别名与置信度
  pub fn draw_plate(&self, image: &mut RgbImage, bbox: &BoundingBox, name: &str) {
    let label = format!("{} {:.2}", name, bbox.confidence);
    self.draw_bbox_with_label(image, bbox, &label, self.plate_color);
  }

  /// 绘制字符框，标签为识别出的字符
  pub fn draw_characters(&self, image: &mut RgbImage, characters: &[CharacterBox]) {
    for character in characters {
      let color = self.class_color(character.bbox.class_id);
      self.draw_bbox_with_label(image, &character.bbox, &character.glyph, color);
    }
  }

  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &BoundingBox,
    label: &str,
    color: Rgb<u8>,
  ) {
    if bbox.width == 0 || bbox.height == 0 {
      return;
    }

    let (x, y) = (bbox.x as i32, bbox.y as i32);
    let rect = Rect::at(x, y).of_size(bbox.width, bbox.height);
    draw_hollow_rect_mut(image, rect, color);

    // 绘制第二个边框以增加可见度
    if bbox.width > 2 && bbox.height > 2 {
      let inner = Rect::at(x + 1, y + 1).of_size(bbox.width - 2, bbox.height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    let Some(font) = &self.font else {
      return;
    };
    if label.is_empty() {
      return;
    }

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, label);
    let tag_height = text_height as i32 + 2 * self.label_text_vertical_padding;

    // 标签放在边框上方，贴近图像顶部时向下压
    let label_y = (y - tag_height).max(0);
    let tag = Rect::at(x, label_y).of_size(text_width.max(1), tag_height.max(1) as u32);
    draw_filled_rect_mut(image, tag, color);
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      x,
      label_y + self.label_text_vertical_padding,
      scale,
      font,
      label,
    );
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
    BoundingBox {
      x,
      y,
      width,
      height,
      confidence: 0.9,
      class_id: 0,
    }
  }

  #[test]
  fn draws_outline_only_on_box_edges() {
    let mut image = RgbImage::new(20, 20);
    Draw::default()
      .without_font()
      .draw_plate(&mut image, &bbox(5, 5, 10, 10), "plate");

    assert_eq!(*image.get_pixel(5, 5), Rgb(PLATE_COLOR));
    assert_eq!(*image.get_pixel(14, 14), Rgb(PLATE_COLOR));
    assert_eq!(*image.get_pixel(6, 6), Rgb(PLATE_COLOR));
    // 框内与框外保持不变
    assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn embedded_font_is_loaded_by_default() {
    assert!(Draw::default().has_font());
    assert!(!Draw::default().without_font().has_font());
  }

  #[test]
  fn label_tag_sits_above_box() {
    let mut image = RgbImage::new(80, 80);
    Draw::default().draw_plate(&mut image, &bbox(10, 50, 40, 20), "plate");

    assert_eq!(*image.get_pixel(10, 50), Rgb(PLATE_COLOR));
    // 标签紧贴边框上方
    assert_ne!(*image.get_pixel(10, 49), Rgb([0, 0, 0]));
    assert_ne!(*image.get_pixel(12, 45), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(30, 60), Rgb([0, 0, 0]));
  }

  #[test]
  fn character_glyph_is_rendered() {
    let draw = Draw::default();
    let render = |glyph: &str| {
      let mut image = RgbImage::new(80, 80);
      draw.draw_characters(
        &mut image,
        &[CharacterBox {
          bbox: bbox(20, 40, 20, 30),
          glyph: glyph.to_string(),
        }],
      );
      image
    };

    let a = render("A");
    assert_ne!(a, render("W"));
    assert_ne!(a, render(""));
  }

  #[test]
  fn palette_wraps_around() {
    let draw = Draw::default();
    assert_eq!(draw.class_color(1), draw.class_color(1 + PALETTE_SIZE as u32));
    assert_ne!(draw.class_color(0), draw.class_color(PALETTE_SIZE as u32 / 2));
  }

  #[test]
  fn missing_font_file_is_reported() {
    assert!(matches!(
      Draw::load_font("/nonexistent/chepai/font.ttf"),
      Err(FontLoadError::Io(_))
    ));
  }
}
