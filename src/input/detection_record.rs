// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/detection_record.rs - 检测记录文件输入
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
  collections::{BTreeMap, VecDeque},
  path::{Path, PathBuf},
};

use image::ImageReader;
use ndarray::{Array1, Array2, Array3, ArrayD};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  results::{ResultFrame, ResultsError},
};

#[derive(Error, Debug)]
pub enum DetectionRecordInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("检测结果错误: {0}")]
  ResultsError(#[from] ResultsError),
  #[error("{0} 各行长度不一致")]
  RaggedArray(&'static str),
}

/// 单帧记录
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRecord {
  /// 相对路径以记录文件所在目录为基准
  pub image: PathBuf,
  #[serde(default)]
  pub boxes: Option<Vec<Vec<f32>>>,
  #[serde(default)]
  pub masks: Option<Vec<Vec<Vec<f32>>>>,
  #[serde(default)]
  pub keypoints: Option<Vec<Vec<Vec<f32>>>>,
  #[serde(default)]
  pub probs: Option<Vec<f32>>,
}

/// 记录文件：类别表 + 逐帧检测结果
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRecord {
  #[serde(default)]
  pub names: BTreeMap<usize, String>,
  pub frames: Vec<FrameRecord>,
}

/// 空列表按 `empty_width` 列处理
fn to_array2(
  rows: Vec<Vec<f32>>,
  empty_width: usize,
  what: &'static str,
) -> Result<ArrayD<f32>, DetectionRecordInputError> {
  let width = rows.first().map_or(empty_width, Vec::len);
  let n = rows.len();
  if rows.iter().any(|r| r.len() != width) {
    return Err(DetectionRecordInputError::RaggedArray(what));
  }
  let flat: Vec<f32> = rows.into_iter().flatten().collect();
  Array2::from_shape_vec((n, width), flat)
    .map(|a| a.into_dyn())
    .map_err(|_| DetectionRecordInputError::RaggedArray(what))
}

fn to_array3(
  planes: Vec<Vec<Vec<f32>>>,
  what: &'static str,
) -> Result<ArrayD<f32>, DetectionRecordInputError> {
  let rows = planes.first().map_or(0, Vec::len);
  let cols = planes
    .first()
    .and_then(|p| p.first())
    .map_or(0, Vec::len);
  let n = planes.len();
  if planes
    .iter()
    .any(|p| p.len() != rows || p.iter().any(|r| r.len() != cols))
  {
    return Err(DetectionRecordInputError::RaggedArray(what));
  }
  let flat: Vec<f32> = planes.into_iter().flatten().flatten().collect();
  Array3::from_shape_vec((n, rows, cols), flat)
    .map(|a| a.into_dyn())
    .map_err(|_| DetectionRecordInputError::RaggedArray(what))
}

impl FrameRecord {
  pub fn into_frame(
    self,
    base: &Path,
    names: &BTreeMap<usize, String>,
  ) -> Result<ResultFrame, DetectionRecordInputError> {
    let path = if self.image.is_absolute() {
      self.image
    } else {
      base.join(self.image)
    };
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    let mut frame = ResultFrame::new(image, path, names.clone());
    if let Some(boxes) = self.boxes {
      frame = frame.with_boxes(to_array2(boxes, 6, "boxes")?)?;
    }
    if let Some(masks) = self.masks {
      frame = frame.with_masks(to_array3(masks, "masks")?)?;
    }
    if let Some(keypoints) = self.keypoints {
      frame = frame.with_keypoints(to_array3(keypoints, "keypoints")?)?;
    }
    if let Some(probs) = self.probs {
      frame = frame.with_probs(Array1::from_vec(probs).into_dyn())?;
    }
    Ok(frame)
  }
}

/// `record:///path/to/record.json`
pub struct DetectionRecordInput {
  base: PathBuf,
  record: DetectionRecord,
}

impl FromUrlWithScheme for DetectionRecordInput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for DetectionRecordInput {
  type Error = DetectionRecordInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectionRecordInputError::SchemeMismatch(format!(
        "期望输入方式 '{}', 实际输入方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::open(url.path())
  }
}

impl DetectionRecordInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, DetectionRecordInputError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let record: DetectionRecord = serde_json::from_str(&text)?;
    info!("已加载检测记录 {}: {} 帧", path.display(), record.frames.len());
    Ok(Self {
      base: path.parent().map(Path::to_path_buf).unwrap_or_default(),
      record,
    })
  }

  pub fn len(&self) -> usize {
    self.record.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.record.frames.is_empty()
  }
}

impl IntoIterator for DetectionRecordInput {
  type Item = ResultFrame;
  type IntoIter = DetectionRecordIter;

  fn into_iter(self) -> Self::IntoIter {
    DetectionRecordIter {
      base: self.base,
      names: self.record.names,
      frames: self.record.frames.into(),
    }
  }
}

/// 逐帧读取图像，读取失败的帧记录错误后跳过
pub struct DetectionRecordIter {
  base: PathBuf,
  names: BTreeMap<usize, String>,
  frames: VecDeque<FrameRecord>,
}

impl Iterator for DetectionRecordIter {
  type Item = ResultFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(record) = self.frames.pop_front() {
      let image = record.image.clone();
      match record.into_frame(&self.base, &self.names) {
        Ok(frame) => return Some(frame),
        Err(e) => error!("跳过无法读取的帧 {}: {}", image.display(), e),
      }
    }
    None
  }
}
