// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results.rs - 单帧检测结果
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
  collections::{BTreeMap, BTreeSet},
  path::PathBuf,
  sync::Arc,
};

use image::RgbImage;
use ndarray::ArrayD;
use thiserror::Error;

use crate::{
  ops,
  tensor::{Device, Precision, TensorView, Transfer},
};

mod boxes;
mod export;
mod keypoints;
mod masks;
mod probs;

pub use self::boxes::{BoxRow, BoxSet};
pub use self::keypoints::{KEYPOINT_VISIBLE_THRESHOLD, KeypointSet};
pub use self::masks::MaskSet;
pub use self::probs::ProbabilityVector;

#[derive(Error, Debug)]
pub enum ResultsError {
  #[error("张量形状无效: {0}")]
  InvalidShape(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 可行驶区域、车道线与语义分割的辅助输出，只做透传
#[derive(Debug, Clone, Default)]
pub struct AuxMaps {
  pub drive_map: Option<Arc<ArrayD<f32>>>,
  pub lane_map: Option<Arc<ArrayD<f32>>>,
  pub seg_map: Option<Arc<ArrayD<f32>>>,
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
  pub preprocess: Option<f64>,
  pub inference: Option<f64>,
  pub postprocess: Option<f64>,
}

/// 一帧的全部检测结果
#[derive(Debug, Clone)]
pub struct ResultFrame {
  pub orig_img: Arc<RgbImage>,
  /// (height, width)
  pub orig_shape: (usize, usize),
  pub boxes: Option<BoxSet>,
  pub masks: Option<MaskSet>,
  pub probs: Option<ProbabilityVector>,
  pub keypoints: Option<KeypointSet>,
  pub aux_maps: AuxMaps,
  pub names: Arc<BTreeMap<usize, String>>,
  pub path: PathBuf,
  pub speed: Speed,
}

impl ResultFrame {
  pub fn new(orig_img: RgbImage, path: impl Into<PathBuf>, names: BTreeMap<usize, String>) -> Self {
    let (w, h) = orig_img.dimensions();
    Self {
      orig_img: Arc::new(orig_img),
      orig_shape: (h as usize, w as usize),
      boxes: None,
      masks: None,
      probs: None,
      keypoints: None,
      aux_maps: AuxMaps::default(),
      names: Arc::new(names),
      path: path.into(),
      speed: Speed::default(),
    }
  }

  pub fn with_boxes(mut self, data: ArrayD<f32>) -> Result<Self, ResultsError> {
    self.boxes = Some(BoxSet::new(data, self.orig_shape)?);
    Ok(self)
  }

  pub fn with_masks(mut self, data: ArrayD<f32>) -> Result<Self, ResultsError> {
    self.masks = Some(MaskSet::new(data, self.orig_shape)?);
    Ok(self)
  }

  pub fn with_probs(mut self, data: ArrayD<f32>) -> Result<Self, ResultsError> {
    self.probs = Some(ProbabilityVector::new(data, self.orig_shape)?);
    Ok(self)
  }

  pub fn with_keypoints(mut self, data: ArrayD<f32>) -> Result<Self, ResultsError> {
    self.keypoints = Some(KeypointSet::new(data, self.orig_shape)?);
    Ok(self)
  }

  pub fn with_aux_maps(mut self, aux_maps: AuxMaps) -> Self {
    self.aux_maps = aux_maps;
    self
  }

  /// 保留图像、路径、类别表与辅助输出，不带任何检测
  pub fn new_sibling(&self) -> Self {
    Self {
      orig_img: self.orig_img.clone(),
      orig_shape: self.orig_shape,
      boxes: None,
      masks: None,
      probs: None,
      keypoints: None,
      aux_maps: self.aux_maps.clone(),
      names: self.names.clone(),
      path: self.path.clone(),
      speed: Speed::default(),
    }
  }

  /// 第一个存在的集合的长度
  pub fn len(&self) -> usize {
    if let Some(boxes) = &self.boxes {
      boxes.len()
    } else if let Some(masks) = &self.masks {
      masks.len()
    } else if let Some(probs) = &self.probs {
      probs.len()
    } else if let Some(keypoints) = &self.keypoints {
      keypoints.len()
    } else {
      0
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 对每个存在的集合执行同一操作；任一集合无法执行时返回 `None`
  pub fn apply(&self, op: &Transfer) -> Option<Self> {
    let mut out = self.new_sibling();
    out.speed = self.speed;
    if let Some(boxes) = &self.boxes {
      out.boxes = Some(boxes.transfer(op)?);
    }
    if let Some(masks) = &self.masks {
      out.masks = Some(masks.transfer(op)?);
    }
    if let Some(probs) = &self.probs {
      out.probs = Some(probs.transfer(op)?);
    }
    if let Some(keypoints) = &self.keypoints {
      out.keypoints = Some(keypoints.transfer(op)?);
    }
    Some(out)
  }

  pub fn select(&self, idx: usize) -> Option<Self> {
    self.apply(&Transfer::Select(idx))
  }

  pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
    // 切片会被截断到有效范围，不会失败
    self
      .apply(&Transfer::Slice(range))
      .unwrap_or_else(|| self.new_sibling())
  }

  pub fn to_device(&self, device: Device) -> Self {
    self
      .apply(&Transfer::Device(device))
      .unwrap_or_else(|| self.new_sibling())
  }

  pub fn cpu(&self) -> Self {
    self.to_device(Device::Cpu)
  }

  pub fn to_precision(&self, precision: Precision) -> Self {
    self
      .apply(&Transfer::Precision(precision))
      .unwrap_or_else(|| self.new_sibling())
  }

  /// 替换检测结果，检测框会被裁剪到原始画面内
  ///
  /// 所有输入校验通过后才写入，任一失败时帧保持不变。
  pub fn update(
    &mut self,
    boxes: Option<ArrayD<f32>>,
    masks: Option<ArrayD<f32>>,
    probs: Option<ProbabilityVector>,
  ) -> Result<(), ResultsError> {
    let boxes = match boxes {
      Some(data) => {
        let checked = BoxSet::new(data, self.orig_shape)?;
        let mut rows = checked.data().to_owned();
        ops::clip_boxes(&mut rows, self.orig_shape);
        Some(BoxSet::from_rows(rows, self.orig_shape)?)
      }
      None => None,
    };
    let masks = masks
      .map(|data| MaskSet::new(data, self.orig_shape))
      .transpose()?;

    if boxes.is_some() {
      self.boxes = boxes;
    }
    if masks.is_some() {
      self.masks = masks;
    }
    if probs.is_some() {
      self.probs = probs;
    }
    Ok(())
  }

  /// 类别表中没有的编号直接显示数字
  pub fn class_name(&self, cls: usize) -> String {
    self
      .names
      .get(&cls)
      .cloned()
      .unwrap_or_else(|| cls.to_string())
  }

  /// 单行日志摘要
  pub fn verbose(&self) -> String {
    let mut log = String::new();
    if self.is_empty() {
      if self.probs.is_none() {
        log.push_str("(no detections), ");
      }
      return log;
    }
    if let Some(probs) = &self.probs {
      let data = probs.data();
      let top5: Vec<String> = probs
        .top5()
        .iter()
        .map(|&j| format!("{} {:.2}", self.class_name(j), data[j]))
        .collect();
      log.push_str(&top5.join(", "));
      log.push_str(", ");
    }
    if let Some(boxes) = &self.boxes {
      let classes: Vec<usize> = boxes.iter().map(|row| row.cls).collect();
      let unique: BTreeSet<usize> = classes.iter().copied().collect();
      for cls in unique {
        let n = classes.iter().filter(|&&c| c == cls).count();
        let plural = if n > 1 { "s" } else { "" };
        log.push_str(&format!("{} {}{}, ", n, self.class_name(cls), plural));
      }
    }
    log
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{arr1, arr2};

  fn names() -> BTreeMap<usize, String> {
    [(0, "car"), (1, "person"), (2, "VLA")]
      .into_iter()
      .map(|(k, v)| (k, v.to_string()))
      .collect()
  }

  fn frame() -> ResultFrame {
    ResultFrame::new(RgbImage::new(640, 480), "frame.jpg", names())
      .with_boxes(
        arr2(&[
          [10.0f32, 20.0, 110.0, 220.0, 0.9, 0.0],
          [300.0, 200.0, 340.0, 260.0, 0.8, 1.0],
          [320.0, 100.0, 360.0, 180.0, 0.7, 0.0],
        ])
        .into_dyn(),
      )
      .unwrap()
  }

  #[test]
  fn test_len_follows_first_present_collection() {
    let frame = frame();
    assert_eq!(frame.orig_shape, (480, 640));
    assert_eq!(frame.len(), 3);
    assert_eq!(frame.new_sibling().len(), 0);
  }

  #[test]
  fn test_select_and_slice() {
    let frame = frame();
    let one = frame.select(1).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one.boxes.as_ref().unwrap().cls()[0], 1.0);
    assert!(frame.select(3).is_none());
    assert_eq!(frame.slice(1..3).len(), 2);
    assert_eq!(one.path, frame.path);
  }

  #[test]
  fn test_update_clips_boxes() {
    let mut frame = frame();
    frame
      .update(Some(arr1(&[-5.0f32, 10.0, 700.0, 500.0, 0.5, 1.0]).into_dyn()), None, None)
      .unwrap();
    let boxes = frame.boxes.as_ref().unwrap();
    assert_eq!(boxes.xyxy().row(0).to_vec(), vec![0.0, 10.0, 640.0, 480.0]);
  }

  #[test]
  fn test_update_rejects_bad_width() {
    let mut frame = frame();
    let err = frame.update(Some(arr2(&[[1.0f32, 2.0, 3.0]]).into_dyn()), None, None);
    assert!(matches!(err, Err(ResultsError::InvalidShape(_))));
    // 失败时保留原有检测
    assert_eq!(frame.len(), 3);
  }

  #[test]
  fn test_update_is_all_or_nothing() {
    let mut frame = frame();
    let err = frame.update(
      Some(arr2(&[[1.0f32, 2.0, 30.0, 40.0, 0.9, 0.0]]).into_dyn()),
      Some(arr1(&[1.0f32, 0.0, 1.0]).into_dyn()),
      None,
    );
    assert!(matches!(err, Err(ResultsError::InvalidShape(_))));
    assert_eq!(frame.boxes.as_ref().map(|b| b.len()), Some(3));
    assert!(frame.masks.is_none());
  }

  #[test]
  fn test_verbose() {
    assert_eq!(frame().verbose(), "2 cars, 1 person, ");
    let empty = ResultFrame::new(RgbImage::new(4, 4), "", names());
    assert_eq!(empty.verbose(), "(no detections), ");
    let cls = ResultFrame::new(RgbImage::new(4, 4), "", names())
      .with_probs(arr1(&[0.1f32, 0.7, 0.2]).into_dyn())
      .unwrap();
    assert_eq!(cls.verbose(), "person 0.70, VLA 0.20, car 0.10, ");
  }

  #[test]
  fn test_precision_keeps_shape() {
    let half = frame().to_precision(Precision::F16);
    let boxes = half.boxes.as_ref().unwrap();
    assert_eq!(boxes.tensor().precision(), Precision::F16);
    assert_eq!(boxes.len(), 3);
  }
}
