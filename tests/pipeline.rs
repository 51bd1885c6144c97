// 该文件是 Chepai （车牌） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use std::sync::Mutex;

use image::{Rgb, RgbImage};
use ndarray::Array2;

use chepai::{
  character::{RecognitionMode, RecognizerWrapper},
  detect::Detection,
  input::{ImageFileInput, collect_images},
  model::{BoundingBox, InferenceError, LabelTable, Model, RawOutputs},
  output::{ArtifactDirectory, CAR_BOX_FILE, PLATE_BOX_FILE, PLATE_SEGMENTED_FILE, RESULT_FILE},
  pipeline::{PipelineContext, PipelineError},
  plate::PlateLocalizer,
  task::{BatchSummary, BatchTask, OneShotTask, Task},
};

/// 返回固定输出的模型，并记录每次输入的尺寸
struct StubModel {
  rows: Vec<Vec<f32>>,
  seen: Mutex<Vec<(u32, u32)>>,
}

impl StubModel {
  fn new(rows: Vec<Vec<f32>>) -> Self {
    Self {
      rows,
      seen: Mutex::new(Vec::new()),
    }
  }

  fn seen(&self) -> Vec<(u32, u32)> {
    self.seen.lock().unwrap().clone()
  }
}

impl Model for StubModel {
  type Input = RgbImage;
  type Output = RawOutputs;
  type Error = InferenceError;

  fn infer(&self, input: &RgbImage) -> Result<RawOutputs, InferenceError> {
    self.seen.lock().unwrap().push(input.dimensions());
    let width = self.rows.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
    let tensor = Array2::from_shape_vec((self.rows.len(), width), flat)?;
    Ok(RawOutputs::from(vec![tensor.into_dyn()]))
  }
}

fn vehicle() -> RgbImage {
  RgbImage::from_fn(200, 100, |x, y| Rgb([(x % 256) as u8, (y * 2) as u8, 90]))
}

/// 车牌位于 (60, 40)，大小 80x20
fn plate_rows(objectness: f32) -> Vec<Vec<f32>> {
  vec![vec![0.5, 0.5, 0.4, 0.2, objectness, 1.0]]
}

/// 车牌图像上三个字符，水平中心 10 / 50 / 30，类别 0 / 1 / 2
fn char_rows() -> Vec<Vec<f32>> {
  vec![
    vec![0.125, 0.5, 0.1, 0.8, 0.9, 1.0, 0.0, 0.0],
    vec![0.625, 0.5, 0.1, 0.8, 0.9, 0.0, 1.0, 0.0],
    vec![0.375, 0.5, 0.1, 0.8, 0.9, 0.0, 0.0, 1.0],
  ]
}

fn pipeline(plate: Vec<Vec<f32>>, labels: LabelTable) -> PipelineContext<StubModel> {
  PipelineContext::new(
    PlateLocalizer::new(Detection::new(StubModel::new(plate))),
    RecognizerWrapper::with_mode(
      RecognitionMode::Trained,
      Detection::new(StubModel::new(char_rows())),
    ),
    labels,
  )
}

fn char_model(pipeline: &PipelineContext<StubModel>) -> &StubModel {
  match pipeline.recognizer() {
    RecognizerWrapper::Trained(localizer) => localizer.detection().model(),
  }
}

#[test]
fn recognizes_characters_in_reading_order() {
  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"]));
  let image = vehicle();
  let recognition = pipeline.run(&image).unwrap();

  let plate = recognition.plate.as_ref().unwrap();
  assert_eq!(
    plate.bbox,
    BoundingBox {
      x: 60,
      y: 40,
      width: 80,
      height: 20,
      confidence: 0.9,
      class_id: 0,
    }
  );
  assert_eq!(plate.image.dimensions(), (80, 20));
  assert_eq!(plate.image.get_pixel(0, 0), image.get_pixel(60, 40));

  assert_eq!(recognition.text(), "ACB");
  assert_eq!(recognition.result.rows, 1);
  assert_eq!(recognition.mode, RecognitionMode::Trained);
  assert_eq!(recognition.segmented.as_ref().unwrap().dimensions(), (80, 20));
  assert_ne!(recognition.annotated, image);

  assert_eq!(pipeline.plate_localizer().detection().model().seen(), vec![(200, 100)]);
  assert_eq!(char_model(&pipeline).seen(), vec![(80, 20)]);
}

#[test]
fn no_plate_leaves_image_untouched() {
  let pipeline = pipeline(plate_rows(0.1), LabelTable::new(["A", "B", "C"]));
  let image = vehicle();
  let recognition = pipeline.run(&image).unwrap();

  assert!(recognition.plate.is_none());
  assert!(recognition.segmented.is_none());
  assert!(recognition.result.is_empty());
  assert_eq!(recognition.text(), "");
  assert_eq!(recognition.annotated, image);
  assert!(char_model(&pipeline).seen().is_empty());
}

#[test]
fn plate_threshold_override_applies() {
  let pipeline =
    pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"])).with_plate_threshold(0.95);
  let recognition = pipeline.run(&vehicle()).unwrap();
  assert!(recognition.plate.is_none());
}

#[test]
fn unknown_character_class_is_an_error() {
  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B"]));
  match pipeline.run(&vehicle()) {
    Err(PipelineError::UnknownClass(e)) => {
      assert_eq!(e.class_id, 2);
      assert_eq!(e.table_len, 2);
    }
    other => panic!("期望 UnknownClass 错误, 实际为 {:?}", other.map(|r| r.result)),
  }
}

#[test]
fn missing_image_file_is_a_load_error() {
  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"]));
  assert!(matches!(
    pipeline.run_file("/nonexistent/chepai/car.jpg"),
    Err(PipelineError::ImageLoad(_))
  ));
}

#[test]
fn one_shot_task_writes_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("car.png");
  vehicle().save(&source).unwrap();

  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"]));
  let output = ArtifactDirectory::new(dir.path().join("out"));
  let input = ImageFileInput::open(&source).unwrap();
  let recognition = OneShotTask.run_task(input, &pipeline, output).unwrap();
  assert_eq!(recognition.text(), "ACB");

  let out = dir.path().join("out");
  for name in [CAR_BOX_FILE, PLATE_BOX_FILE, PLATE_SEGMENTED_FILE, RESULT_FILE] {
    assert!(out.join(name).is_file(), "{} 缺失", name);
  }
  let report: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(out.join(RESULT_FILE)).unwrap()).unwrap();
  assert_eq!(report["text"], "ACB");
  assert_eq!(report["plate"]["x"], 60);
}

#[test]
fn batch_task_skips_unreadable_images() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("cars");
  std::fs::create_dir_all(&input).unwrap();
  vehicle().save(input.join("a.png")).unwrap();
  std::fs::write(input.join("b.jpg"), b"not a jpeg").unwrap();
  std::fs::write(input.join("notes.txt"), b"ignored").unwrap();

  let images = collect_images(&input).unwrap();
  assert_eq!(images.len(), 2);

  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"]));
  let output = ArtifactDirectory::new(dir.path().join("out"));
  let summary = BatchTask::default()
    .run_task(images, &pipeline, output)
    .unwrap();

  assert_eq!(
    summary,
    BatchSummary {
      processed: 1,
      recognized: 1,
      skipped: 1,
    }
  );
  assert!(dir.path().join("out").join("a.png").join(RESULT_FILE).is_file());
  assert!(!dir.path().join("out").join("b.jpg").exists());
}

#[test]
fn batch_task_keeps_same_stem_images_apart() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("cars");
  std::fs::create_dir_all(&input).unwrap();
  vehicle().save(input.join("a.png")).unwrap();
  vehicle().save(input.join("a.jpg")).unwrap();

  let images = collect_images(&input).unwrap();
  let pipeline = pipeline(plate_rows(0.9), LabelTable::new(["A", "B", "C"]));
  let out = dir.path().join("out");
  let summary = BatchTask::default()
    .run_task(images, &pipeline, ArtifactDirectory::new(&out))
    .unwrap();
  assert_eq!(summary.processed, 2);

  let mut dirs: Vec<String> = std::fs::read_dir(&out)
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  dirs.sort();
  assert_eq!(dirs, vec!["a.jpg", "a.png"]);

  for name in ["a.jpg", "a.png"] {
    let report: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(out.join(name).join(RESULT_FILE)).unwrap())
        .unwrap();
    assert!(report["source"].as_str().unwrap().ends_with(name));
  }
}
