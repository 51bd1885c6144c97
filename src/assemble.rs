// 该文件是 Chepai （车牌） 项目的一部分。
// src/assemble.rs - 字符排序与车牌文本拼接
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
use serde::Serialize;
use tracing::debug;

use crate::{
  model::{BoundingBox, LabelTable, UnknownClassError},
  output::draw::Draw,
};

const DEFAULT_ROW_TOLERANCE: f32 = 1.0;

/// 带字符的检测框
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterBox {
  pub bbox: BoundingBox,
  pub glyph: String,
}

/// 按阅读顺序排列的字符与拼接出的车牌文本
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlateResult {
  pub characters: Vec<CharacterBox>,
  pub text: String,
  pub rows: usize,
}

impl PlateResult {
  pub fn is_empty(&self) -> bool {
    self.characters.is_empty()
  }
}

fn mean_center_y(row: &[CharacterBox]) -> f32 {
  row.iter().map(|c| c.bbox.center_y()).sum::<f32>() / row.len() as f32
}

pub struct PlateAssembler {
  row_tolerance: f32,
  draw: Draw,
}

impl Default for PlateAssembler {
  fn default() -> Self {
    Self {
      row_tolerance: DEFAULT_ROW_TOLERANCE,
      draw: Draw::default(),
    }
  }
}

impl PlateAssembler {
  /// 行聚类的容差，单位为字符框高度
  pub fn with_row_tolerance(mut self, row_tolerance: f32) -> Self {
    self.row_tolerance = row_tolerance;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 将字符框排成阅读顺序并拼接文本，同时在车牌图像副本上绘制字符框
  ///
  /// 任一类别在标签表中缺失时返回 `UnknownClassError`，不产生部分结果。
  pub fn assemble(
    &self,
    plate: &RgbImage,
    boxes: &[BoundingBox],
    labels: &LabelTable,
  ) -> Result<(PlateResult, RgbImage), UnknownClassError> {
    let characters = boxes
      .iter()
      .map(|bbox| {
        labels.glyph(bbox.class_id).map(|glyph| CharacterBox {
          bbox: *bbox,
          glyph: glyph.to_string(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let mut visualization = plate.clone();
    if characters.is_empty() {
      return Ok((PlateResult::default(), visualization));
    }

    let rows = self.group_rows(characters);
    let row_count = rows.len();
    let characters: Vec<CharacterBox> = rows.into_iter().flatten().collect();
    let text: String = characters.iter().map(|c| c.glyph.as_str()).collect();
    debug!("{} 行共 {} 个字符: {}", row_count, characters.len(), text);

    self.draw.draw_characters(&mut visualization, &characters);

    Ok((
      PlateResult {
        characters,
        text,
        rows: row_count,
      },
      visualization,
    ))
  }

  /// 自左向右逐个归行：与某行最右字符的垂直中心相差不超过容差即接入该行，
  /// 因此倾斜的车牌仍是一行。行按平均垂直中心自上而下排列。
  fn group_rows(&self, mut characters: Vec<CharacterBox>) -> Vec<Vec<CharacterBox>> {
    characters.sort_by(|a, b| {
      a.bbox
        .center_x()
        .total_cmp(&b.bbox.center_x())
        .then(a.bbox.center_y().total_cmp(&b.bbox.center_y()))
    });

    let mut rows: Vec<Vec<CharacterBox>> = Vec::new();
    for character in characters {
      let center_y = character.bbox.center_y();
      let nearest = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
          let last = row.last()?;
          let distance = (center_y - last.bbox.center_y()).abs();
          let height = last.bbox.height.max(character.bbox.height) as f32;
          (distance <= self.row_tolerance * height).then_some((index, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index);

      match nearest {
        Some(index) => rows[index].push(character),
        None => rows.push(vec![character]),
      }
    }

    rows.sort_by(|a, b| mean_center_y(a).total_cmp(&mean_center_y(b)));
    rows
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn glyph_box(center_x: u32, center_y: u32, class_id: u32) -> BoundingBox {
    BoundingBox {
      x: center_x - 5,
      y: center_y - 10,
      width: 10,
      height: 20,
      confidence: 0.9,
      class_id,
    }
  }

  fn plate_image() -> RgbImage {
    RgbImage::from_pixel(120, 80, Rgb([200, 200, 200]))
  }

  #[test]
  fn orders_single_row_by_horizontal_center() {
    let labels = LabelTable::new(["A", "B", "C"]);
    let boxes = [glyph_box(10, 20, 0), glyph_box(50, 20, 1), glyph_box(30, 20, 2)];
    let (result, _) = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap();

    assert_eq!(result.text, "ACB");
    assert_eq!(result.rows, 1);
    assert_eq!(result.characters.len(), 3);
  }

  #[test]
  fn tolerates_slanted_single_row() {
    let labels = LabelTable::new(["1", "2", "3", "4"]);
    let boxes = [
      glyph_box(70, 32, 3),
      glyph_box(10, 20, 0),
      glyph_box(30, 24, 1),
      glyph_box(50, 28, 2),
    ];
    let (result, _) = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap();
    assert_eq!(result.text, "1234");
    assert_eq!(result.rows, 1);
  }

  #[test]
  fn tolerates_upward_slanted_row() {
    let labels = LabelTable::new(["1", "2", "3", "4", "5", "6"]);
    // 每个字符比左侧相邻字符高 8 像素，首尾相差 40 像素
    let boxes: Vec<BoundingBox> = (0..6)
      .map(|i| glyph_box(10 + 20 * i, 60 - 8 * i, i))
      .collect();
    let (result, _) = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap();
    assert_eq!(result.text, "123456");
    assert_eq!(result.rows, 1);
  }

  #[test]
  fn slanted_two_row_plate_keeps_rows_apart() {
    let labels = LabelTable::new(["A", "B", "1", "2", "3"]);
    let boxes = [
      glyph_box(20, 64, 2),
      glyph_box(40, 16, 0),
      glyph_box(60, 56, 4),
      glyph_box(60, 12, 1),
      glyph_box(40, 60, 3),
    ];
    let (result, _) = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap();
    assert_eq!(result.text, "AB123");
    assert_eq!(result.rows, 2);
  }

  #[test]
  fn reads_two_rows_top_to_bottom() {
    let labels = LabelTable::new(["A", "B", "1", "2", "3"]);
    let boxes = [
      glyph_box(40, 60, 3),
      glyph_box(60, 15, 1),
      glyph_box(20, 60, 2),
      glyph_box(40, 15, 0),
      glyph_box(60, 60, 4),
    ];
    let (result, _) = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap();
    assert_eq!(result.text, "AB123");
    assert_eq!(result.rows, 2);
  }

  #[test]
  fn empty_input_gives_empty_text_and_untouched_image() {
    let plate = plate_image();
    let (result, visualization) = PlateAssembler::default()
      .assemble(&plate, &[], &LabelTable::new(["A"]))
      .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.text, "");
    assert_eq!(visualization, plate);
  }

  #[test]
  fn unknown_class_is_rejected_wherever_it_appears() {
    let labels = LabelTable::new(["A", "B"]);
    let boxes = [glyph_box(10, 20, 0), glyph_box(30, 20, 7), glyph_box(50, 20, 1)];
    let err = PlateAssembler::default()
      .assemble(&plate_image(), &boxes, &labels)
      .unwrap_err();
    assert_eq!(err.class_id, 7);

    let mut low = glyph_box(90, 60, 9);
    low.confidence = 0.01;
    let err = PlateAssembler::default()
      .assemble(&plate_image(), &[low], &labels)
      .unwrap_err();
    assert_eq!(err.class_id, 9);
  }

  #[test]
  fn visualization_marks_characters() {
    let plate = plate_image();
    let boxes = [glyph_box(30, 20, 0)];
    let (_, visualization) = PlateAssembler::default()
      .assemble(&plate, &boxes, &LabelTable::new(["A"]))
      .unwrap();
    assert_ne!(visualization, plate);
    assert_ne!(*visualization.get_pixel(25, 10), Rgb([200, 200, 200]));
  }
}
