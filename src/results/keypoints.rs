// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results/keypoints.rs - 关键点集合
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

use std::sync::OnceLock;

use ndarray::{Array2, Array3, ArrayD, ArrayView3, Axis, Ix3, s};

use crate::{
  results::ResultsError,
  tensor::{Tensor, TensorView},
};

/// 置信度低于该值的关键点视为不可见
pub const KEYPOINT_VISIBLE_THRESHOLD: f32 = 0.5;

/// 关键点，形状 (n, k, 2) 或 (n, k, 3)，第三通道为置信度
#[derive(Debug)]
pub struct KeypointSet {
  tensor: Tensor,
  has_visible: bool,
  xy: OnceLock<Array3<f32>>,
  xyn: OnceLock<Array3<f32>>,
  conf: OnceLock<Option<Array2<f32>>>,
}

impl Clone for KeypointSet {
  fn clone(&self) -> Self {
    self.with_tensor(self.tensor.clone())
  }
}

impl KeypointSet {
  pub fn new(data: ArrayD<f32>, orig_shape: (usize, usize)) -> Result<Self, ResultsError> {
    let mut data = match data.ndim() {
      2 => data.insert_axis(Axis(0)),
      3 => data,
      n => {
        return Err(ResultsError::InvalidShape(format!(
          "关键点应为二维或三维张量, 实际为 {} 维",
          n
        )));
      }
    };
    let channels = data.shape()[2];
    if channels != 2 && channels != 3 {
      return Err(ResultsError::InvalidShape(format!(
        "关键点最后一维应为 2 或 3, 实际为 {}",
        channels
      )));
    }

    if channels == 3 {
      for mut point in data.lanes_mut(Axis(2)) {
        if point[2] < KEYPOINT_VISIBLE_THRESHOLD {
          point[0] = 0.0;
          point[1] = 0.0;
        }
      }
    }

    Ok(Self::from_checked(Tensor::new(data, orig_shape)))
  }

  fn from_checked(tensor: Tensor) -> Self {
    let has_visible = tensor.shape().get(2) == Some(&3);
    Self {
      tensor,
      has_visible,
      xy: OnceLock::new(),
      xyn: OnceLock::new(),
      conf: OnceLock::new(),
    }
  }

  pub fn data(&self) -> ArrayView3<'_, f32> {
    self
      .tensor
      .data()
      .view()
      .into_dimensionality::<Ix3>()
      .expect("关键点在构造时已校验为三维")
  }

  pub fn has_visible(&self) -> bool {
    self.has_visible
  }

  pub fn xy(&self) -> &Array3<f32> {
    self
      .xy
      .get_or_init(|| self.data().slice(s![.., .., 0..2]).to_owned())
  }

  pub fn xyn(&self) -> &Array3<f32> {
    self.xyn.get_or_init(|| {
      let (h, w) = self.tensor.orig_shape();
      let mut xy = self.xy().clone();
      for mut p in xy.lanes_mut(Axis(2)) {
        p[0] /= w as f32;
        p[1] /= h as f32;
      }
      xy
    })
  }

  pub fn conf(&self) -> Option<&Array2<f32>> {
    self
      .conf
      .get_or_init(|| {
        self
          .has_visible
          .then(|| self.data().slice(s![.., .., 2]).to_owned())
      })
      .as_ref()
  }
}

impl TensorView for KeypointSet {
  fn tensor(&self) -> &Tensor {
    &self.tensor
  }

  fn with_tensor(&self, tensor: Tensor) -> Self {
    Self::from_checked(tensor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::arr3;

  #[test]
  fn test_low_confidence_points_are_zeroed() {
    let kpts = KeypointSet::new(
      arr3(&[[[10.0f32, 20.0, 0.4], [30.0, 40.0, 0.6]]]).into_dyn(),
      (100, 200),
    )
    .unwrap();
    assert!(kpts.has_visible());
    let xy = kpts.xy();
    assert_eq!((xy[[0, 0, 0]], xy[[0, 0, 1]]), (0.0, 0.0));
    assert_eq!((xy[[0, 1, 0]], xy[[0, 1, 1]]), (30.0, 40.0));
    // 置信度本身保留
    assert_eq!(kpts.conf().unwrap()[[0, 0]], 0.4);
  }

  #[test]
  fn test_without_confidence_channel() {
    let kpts =
      KeypointSet::new(ndarray::arr2(&[[50.0f32, 25.0], [0.0, 0.0]]).into_dyn(), (100, 200))
        .unwrap();
    assert_eq!(kpts.len(), 1);
    assert!(!kpts.has_visible());
    assert!(kpts.conf().is_none());
    let xyn = kpts.xyn();
    assert_eq!((xyn[[0, 0, 0]], xyn[[0, 0, 1]]), (0.25, 0.25));
  }

  #[test]
  fn test_rejects_bad_channels() {
    let bad = ndarray::Array3::<f32>::zeros((1, 17, 4)).into_dyn();
    assert!(KeypointSet::new(bad, (10, 10)).is_err());
  }
}
