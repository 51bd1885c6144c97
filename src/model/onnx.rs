// 该文件是 Chepai （车牌） 项目的一部分。
// src/model/onnx.rs - 基于 ONNX Runtime 的 YOLO 检测器
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
use std::sync::Mutex;

use image::RgbImage;
use ndarray::{ArrayD, IxDyn};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::{TensorRef, ValueType},
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwFrame,
  model::{DetectorConfig, InferenceError, Model, ModelLoadError, RawOutputs},
  url_to_path,
};

const YOLO_NUM_INPUTS: usize = 1;
const YOLO_INPUT_RANK: usize = 4;

/// YOLO 目标检测器
///
/// 推理会话放在互斥锁后面，`infer` 只需要 `&self`，多个线程共享同一检测器时推理串行执行。
pub struct YoloDetector {
  session: Mutex<Session>,
  input_name: String,
  output_names: Vec<String>,
  config: DetectorConfig,
}

pub struct YoloDetectorBuilder {
  weights_path: PathBuf,
  config_path: PathBuf,
}

impl FromUrlWithScheme for YoloDetectorBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloDetectorBuilder {
  type Error = ModelLoadError;

  /// `onnx:///path/to/model.onnx?config=/path/to/model.json`
  ///
  /// 省略 `config` 时使用与权重同名的 `.json` 文件。
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let weights_path = url_to_path(url);
    let config_path = url
      .query_pairs()
      .find(|(k, _)| k == "config")
      .map(|(_, v)| PathBuf::from(v.into_owned()))
      .unwrap_or_else(|| weights_path.with_extension("json"));

    Ok(YoloDetectorBuilder {
      weights_path,
      config_path,
    })
  }
}

impl YoloDetectorBuilder {
  pub fn new(weights_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
    Self {
      weights_path: weights_path.into(),
      config_path: config_path.into(),
    }
  }

  pub fn build(self) -> Result<YoloDetector, ModelLoadError> {
    info!("加载模型配置: {}", self.config_path.display());
    let config = DetectorConfig::from_file(&self.config_path)?;

    info!("加载模型文件: {}", self.weights_path.display());
    let weights = std::fs::read(&self.weights_path).map_err(|source| ModelLoadError::Io {
      path: self.weights_path.clone(),
      source,
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      weights.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()
      .map_err(|e| ModelLoadError::runtime("session_builder", e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| ModelLoadError::runtime("optimization_level", e))?
      .with_intra_threads(config.intra_threads)
      .map_err(|e| ModelLoadError::runtime("intra_threads", e))?
      .commit_from_memory(&weights)
      .map_err(|e| ModelLoadError::runtime("commit", e))?;

    let (input_name, output_names) = check_architecture(&session, &config)?;
    info!("模型加载完成: {}", self.weights_path.display());

    Ok(YoloDetector {
      session: Mutex::new(session),
      input_name,
      output_names,
      config,
    })
  }
}

/// 检查模型的输入输出是否与配置一致，返回输入名称与输出名称列表
fn check_architecture(
  session: &Session,
  config: &DetectorConfig,
) -> Result<(String, Vec<String>), ModelLoadError> {
  if session.inputs.len() != YOLO_NUM_INPUTS {
    error!(
      "预期模型输入数量为 {}, 实际为 {}",
      YOLO_NUM_INPUTS,
      session.inputs.len()
    );
    return Err(ModelLoadError::ArchitectureMismatch(format!(
      "预期模型输入数量为 {}, 实际为 {}",
      YOLO_NUM_INPUTS,
      session.inputs.len()
    )));
  }
  if session.outputs.is_empty() {
    return Err(ModelLoadError::ArchitectureMismatch(
      "模型没有输出".to_string(),
    ));
  }

  let input = &session.inputs[0];
  if let ValueType::Tensor { shape, .. } = &input.input_type {
    let dims: Vec<i64> = shape.iter().copied().collect();
    debug!("模型输入 {}: {:?}", input.name, dims);
    if dims.len() != YOLO_INPUT_RANK {
      return Err(ModelLoadError::ArchitectureMismatch(format!(
        "模型输入应为 NCHW 四维张量, 实际维度 {:?}",
        dims
      )));
    }
    let expected = [config.input_height as i64, config.input_width as i64];
    for (actual, expected) in dims[2..].iter().zip(expected) {
      // 动态维度为负数
      if *actual > 0 && *actual != expected {
        return Err(ModelLoadError::ArchitectureMismatch(format!(
          "模型输入尺寸 {:?} 与配置 {}x{} 不一致",
          dims, config.input_width, config.input_height
        )));
      }
    }
  }

  let feature_width = config.feature_width() as i64;
  for output in session.outputs.iter() {
    if let ValueType::Tensor { shape, .. } = &output.output_type {
      let dims: Vec<i64> = shape.iter().copied().collect();
      debug!("模型输出 {}: {:?}", output.name, dims);
      if let Some(&last) = dims.last()
        && last > 0
        && last != feature_width
      {
        return Err(ModelLoadError::ArchitectureMismatch(format!(
          "输出 {} 的特征长度为 {}, 但标签表要求 {}",
          output.name, last, feature_width
        )));
      }
    }
  }

  Ok((
    input.name.clone(),
    session.outputs.iter().map(|o| o.name.clone()).collect(),
  ))
}

impl YoloDetector {
  /// 从权重文件与配置文件加载检测器
  pub fn load(
    weights_path: impl AsRef<Path>,
    config_path: impl AsRef<Path>,
  ) -> Result<Self, ModelLoadError> {
    YoloDetectorBuilder::new(weights_path.as_ref(), config_path.as_ref()).build()
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }
}

impl Model for YoloDetector {
  type Input = RgbImage;
  type Output = RawOutputs;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let frame = RgbNchwFrame::from_image(input, self.config.input_width, self.config.input_height);
    let tensor = TensorRef::from_array_view(frame.as_array().view())
      .map_err(|e| InferenceError::runtime("tensor_conversion", e))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| InferenceError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(|e| InferenceError::runtime("forward_pass", e))?;

    debug!("获取模型输出");
    let mut tensors = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let (shape, data) = outputs[name.as_str()]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::runtime("output_extraction", e))?;
      let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
      debug!("输出 {} 形状: {:?}", name, dims);
      tensors.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
    }

    Ok(RawOutputs { tensors })
  }
}
