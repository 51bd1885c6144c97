// 该文件是 Chepai （车牌） 项目的一部分。
// src/task.rs - 任务定义
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

use std::{
  path::{Path, PathBuf},
  sync::mpsc::Receiver,
  thread,
  time::Duration,
};

use image::RgbImage;
use tracing::{error, info, warn};

use crate::{
  input::ImageFileInput,
  model::{InferenceError, Model, RawOutputs},
  output::{ArtifactDirectory, Render},
  pipeline::{PipelineContext, PipelineError, Recognition},
};

pub trait Task<I, P, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, pipeline: P, output: O) -> Result<Self::Output, Self::Error>;
}

/// 识别单张图像
pub struct OneShotTask;

impl<'a, M, O, RE> Task<ImageFileInput, &'a PipelineContext<M>, O> for OneShotTask
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
  O: Render<Path, Recognition, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = Recognition;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: ImageFileInput,
    pipeline: &'a PipelineContext<M>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    let recognition = pipeline.run(input.image())?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());
    output.render_result(input.path(), &recognition)?;
    info!("任务完成，车牌: {:?}", recognition.text());

    Ok(recognition)
  }
}

/// 批量任务的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub processed: usize,
  pub recognized: usize,
  pub skipped: usize,
}

/// 逐张识别目录中的图像，每张图像的产物写入以完整文件名命名的子目录
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
}

impl BatchTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }
}

/// 安装 Ctrl-C 处理器，已有处理器时返回 `None`
fn install_interrupt() -> Option<Receiver<()>> {
  let (tx, rx) = std::sync::mpsc::channel();

  let installed = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });

  match installed {
    Ok(()) => Some(rx),
    Err(e) => {
      warn!("无法设置中断处理器: {}", e);
      None
    }
  }
}

impl<'a, M> Task<Vec<PathBuf>, &'a PipelineContext<M>, ArtifactDirectory> for BatchTask
where
  M: Model<Input = RgbImage, Output = RawOutputs, Error = InferenceError>,
{
  type Output = BatchSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: Vec<PathBuf>,
    pipeline: &'a PipelineContext<M>,
    output: ArtifactDirectory,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务，共 {} 张图像...", input.len());
    let interrupt = install_interrupt();

    let mut summary = BatchSummary::default();
    for (index, path) in input.iter().enumerate() {
      if self.limit.map(|n| index >= n).unwrap_or(false) {
        info!("达到指定数量 {}, 退出任务循环", index);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      info!("处理第 {} 张图像: {}", index + 1, path.display());
      let recognition = match pipeline.run_file(path) {
        Ok(recognition) => recognition,
        Err(PipelineError::ImageLoad(e)) => {
          error!("跳过无法读取的图像: {}", e);
          summary.skipped += 1;
          continue;
        }
        Err(e) => return Err(e.into()),
      };

      // 用完整文件名，a.png 与 a.jpg 不会写进同一目录
      let name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| format!("{:04}", index).into());
      output.join(name).render_result(path, &recognition)?;

      summary.processed += 1;
      if !recognition.result.is_empty() {
        summary.recognized += 1;
      }
    }

    info!(
      "任务完成: 处理 {} 张, 识别 {} 张, 跳过 {} 张",
      summary.processed, summary.recognized, summary.skipped
    );
    Ok(summary)
  }
}
