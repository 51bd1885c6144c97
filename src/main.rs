// 该文件是 Chepai （车牌） 项目的一部分。
// src/main.rs - 单张图像车牌识别
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use chepai::{
  FromUrl,
  args::PipelineArgs,
  input::ImageFileInput,
  output::ArtifactDirectory,
  task::{OneShotTask, Task},
};

/// Chepai 车牌识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,
  /// 输入图像，例如 image:///data/car.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录，例如 folder:///data/result
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("车牌模型: {}", args.pipeline.plate_model);
  info!("字符模型: {}", args.pipeline.char_model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let pipeline = args.pipeline.load_pipeline()?;
  let input = ImageFileInput::from_url(&args.input)?;
  let output = ArtifactDirectory::from_url(&args.output)?;

  let recognition = OneShotTask.run_task(input, &pipeline, output)?;
  println!("{}", recognition.text());

  Ok(())
}
