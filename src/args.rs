// 该文件是 Chepai （车牌） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Args;
use url::Url;

use crate::character::RecognitionMode;

/// 两个检测模型及识别参数，各个程序共用
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 车牌检测模型，例如 onnx:///models/plate.onnx?config=/models/plate.json
  #[arg(long, value_name = "MODEL")]
  pub plate_model: Url,

  /// 字符检测模型，配置文件中的 labels 即字符表
  #[arg(long, value_name = "MODEL")]
  pub char_model: Url,

  /// 识别模式
  #[arg(long, value_enum, default_value_t = RecognitionMode::Trained)]
  pub mode: RecognitionMode,

  /// 标签字体文件（TTF/OTF），不指定时使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 车牌置信度阈值 (0.0 - 1.0)，默认取模型配置
  #[arg(long, value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub plate_threshold: Option<f32>,

  /// 字符置信度阈值 (0.0 - 1.0)，默认取模型配置
  #[arg(long, value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub char_threshold: Option<f32>,

  /// 行聚类容差，单位为字符框高度
  #[arg(long, default_value = "1.0", value_name = "TOLERANCE")]
  pub row_tolerance: f32,
}

/// 解析 [0, 1] 区间内的阈值
fn parse_threshold(value: &str) -> Result<f32, String> {
  let threshold: f32 = value
    .parse()
    .map_err(|e| format!("'{}' 不是有效的数值: {}", value, e))?;
  if (0.0..=1.0).contains(&threshold) {
    Ok(threshold)
  } else {
    Err(format!("阈值 {} 不在 [0, 1] 区间内", threshold))
  }
}

#[cfg(feature = "model_onnx")]
impl PipelineArgs {
  /// 加载模型与字体，构建流水线
  pub fn load_pipeline(
    &self,
  ) -> anyhow::Result<crate::pipeline::PipelineContext<crate::model::YoloDetector>> {
    use anyhow::Context;
    use tracing::info;

    use crate::{assemble::PlateAssembler, output::draw::Draw, pipeline::PipelineContext};

    let mut draw = Draw::default();
    if let Some(font) = &self.font {
      let font = Draw::load_font(font).with_context(|| format!("无法加载字体 {}", font.display()))?;
      draw = draw.with_font(font);
    }

    let mut pipeline = PipelineContext::load(&self.plate_model, &self.char_model, self.mode)
      .context("模型加载失败")?
      .with_assembler(PlateAssembler::default().with_row_tolerance(self.row_tolerance))
      .with_draw(draw);

    if let Some(threshold) = self.plate_threshold {
      info!("车牌置信度阈值: {}", threshold);
      pipeline = pipeline.with_plate_threshold(threshold);
    }
    if let Some(threshold) = self.char_threshold {
      info!("字符置信度阈值: {}", threshold);
      pipeline = pipeline.with_char_threshold(threshold);
    }

    Ok(pipeline)
  }
}
