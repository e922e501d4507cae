// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results/boxes.rs - 检测框集合
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

use ndarray::{Array1, Array2, ArrayD, ArrayView2, Axis, Ix2, s};

use crate::{
  adas::BoxRect,
  ops,
  results::ResultsError,
  tensor::{Tensor, TensorView},
};

/// 检测框，每行为 `(x1, y1, x2, y2, conf, cls)`，
/// 带跟踪时为 `(x1, y1, x2, y2, track_id, conf, cls)`
#[derive(Debug)]
pub struct BoxSet {
  tensor: Tensor,
  is_track: bool,
  xyxy: OnceLock<Array2<f32>>,
  conf: OnceLock<Array1<f32>>,
  cls: OnceLock<Array1<f32>>,
  id: OnceLock<Option<Array1<f32>>>,
  xywh: OnceLock<Array2<f32>>,
  xyxyn: OnceLock<Array2<f32>>,
  xywhn: OnceLock<Array2<f32>>,
}

/// 单个检测框的只读快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRow {
  pub index: usize,
  pub rect: BoxRect,
  pub conf: f32,
  pub cls: usize,
  pub id: Option<i64>,
}

impl Clone for BoxSet {
  fn clone(&self) -> Self {
    self.with_tensor(self.tensor.clone())
  }
}

impl BoxSet {
  pub fn new(data: ArrayD<f32>, orig_shape: (usize, usize)) -> Result<Self, ResultsError> {
    let data = match data.ndim() {
      1 => data.insert_axis(Axis(0)),
      2 => data,
      n => {
        return Err(ResultsError::InvalidShape(format!(
          "检测框应为二维张量, 实际为 {} 维",
          n
        )));
      }
    };
    let width = data.shape()[1];
    if width != 6 && width != 7 {
      return Err(ResultsError::InvalidShape(format!(
        "检测框每行应为 6 或 7 列, 实际为 {} 列",
        width
      )));
    }
    Ok(Self::from_checked(Tensor::new(data, orig_shape)))
  }

  pub fn from_rows(rows: Array2<f32>, orig_shape: (usize, usize)) -> Result<Self, ResultsError> {
    Self::new(rows.into_dyn(), orig_shape)
  }

  fn from_checked(tensor: Tensor) -> Self {
    let is_track = tensor.shape().get(1) == Some(&7);
    Self {
      tensor,
      is_track,
      xyxy: OnceLock::new(),
      conf: OnceLock::new(),
      cls: OnceLock::new(),
      id: OnceLock::new(),
      xywh: OnceLock::new(),
      xyxyn: OnceLock::new(),
      xywhn: OnceLock::new(),
    }
  }

  fn rows(&self) -> ArrayView2<'_, f32> {
    self
      .tensor
      .data()
      .view()
      .into_dimensionality::<Ix2>()
      .expect("检测框在构造时已校验为二维")
  }

  pub fn is_track(&self) -> bool {
    self.is_track
  }

  pub fn data(&self) -> ArrayView2<'_, f32> {
    self.rows()
  }

  pub fn xyxy(&self) -> &Array2<f32> {
    self
      .xyxy
      .get_or_init(|| self.rows().slice(s![.., 0..4]).to_owned())
  }

  pub fn conf(&self) -> &Array1<f32> {
    self.conf.get_or_init(|| {
      let rows = self.rows();
      rows.column(rows.ncols() - 2).to_owned()
    })
  }

  pub fn cls(&self) -> &Array1<f32> {
    self.cls.get_or_init(|| {
      let rows = self.rows();
      rows.column(rows.ncols() - 1).to_owned()
    })
  }

  /// 跟踪编号，非跟踪结果为 `None`
  pub fn id(&self) -> Option<&Array1<f32>> {
    self
      .id
      .get_or_init(|| self.is_track.then(|| self.rows().column(4).to_owned()))
      .as_ref()
  }

  pub fn xywh(&self) -> &Array2<f32> {
    self
      .xywh
      .get_or_init(|| ops::xyxy_to_xywh(self.xyxy().view()))
  }

  pub fn xyxyn(&self) -> &Array2<f32> {
    self.xyxyn.get_or_init(|| {
      let (h, w) = self.tensor.orig_shape();
      let mut xyxy = self.xyxy().clone();
      for mut row in xyxy.axis_iter_mut(Axis(0)) {
        row[0] /= w as f32;
        row[1] /= h as f32;
        row[2] /= w as f32;
        row[3] /= h as f32;
      }
      xyxy
    })
  }

  pub fn xywhn(&self) -> &Array2<f32> {
    self.xywhn.get_or_init(|| {
      let (h, w) = self.tensor.orig_shape();
      let mut xywh = self.xywh().clone();
      for mut row in xywh.axis_iter_mut(Axis(0)) {
        row[0] /= w as f32;
        row[1] /= h as f32;
        row[2] /= w as f32;
        row[3] /= h as f32;
      }
      xywh
    })
  }

  pub fn row(&self, index: usize) -> Option<BoxRow> {
    let rows = self.rows();
    if index >= rows.nrows() {
      return None;
    }
    let r = rows.row(index);
    let n = r.len();
    Some(BoxRow {
      index,
      rect: BoxRect::new(r[0], r[1], r[2], r[3]),
      conf: r[n - 2],
      cls: r[n - 1].max(0.0) as usize,
      id: self.is_track.then(|| r[4] as i64),
    })
  }

  /// 按检测器输出顺序遍历
  pub fn iter(&self) -> impl DoubleEndedIterator<Item = BoxRow> + '_ {
    (0..self.len()).filter_map(move |i| self.row(i))
  }
}

impl TensorView for BoxSet {
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
  use ndarray::{arr1, arr2};
  use proptest::prelude::*;

  #[test]
  fn test_row_width_validation() {
    let bad = arr2(&[[1.0f32, 2.0, 3.0, 4.0, 0.5]]).into_dyn();
    assert!(matches!(
      BoxSet::new(bad, (480, 640)),
      Err(ResultsError::InvalidShape(_))
    ));
    let cube = ndarray::Array3::<f32>::zeros((1, 1, 6)).into_dyn();
    assert!(BoxSet::new(cube, (480, 640)).is_err());
  }

  #[test]
  fn test_single_row_is_promoted() {
    let boxes = BoxSet::new(arr1(&[10.0f32, 20.0, 30.0, 40.0, 0.9, 2.0]).into_dyn(), (100, 100))
      .unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes.shape(), &[1, 6]);
    assert!(boxes.id().is_none());
    assert_eq!(boxes.cls(), &arr1(&[2.0]));
  }

  #[test]
  fn test_track_id_column() {
    let boxes = BoxSet::from_rows(
      arr2(&[[0.0f32, 0.0, 10.0, 10.0, 7.0, 0.8, 3.0]]),
      (100, 100),
    )
    .unwrap();
    assert!(boxes.is_track());
    assert_eq!(boxes.id(), Some(&arr1(&[7.0])));
    assert_eq!(boxes.conf(), &arr1(&[0.8]));
    // 派生列只计算一次
    assert!(std::ptr::eq(boxes.conf(), boxes.conf()));
    assert!(std::ptr::eq(boxes.cls(), boxes.cls()));
    assert!(boxes.id().zip(boxes.id()).is_some_and(|(a, b)| std::ptr::eq(a, b)));
    let row = boxes.row(0).unwrap();
    assert_eq!(row.id, Some(7));
    assert_eq!(row.cls, 3);
  }

  #[test]
  fn test_derived_views_are_cached() {
    let boxes = BoxSet::from_rows(arr2(&[[0.0f32, 0.0, 64.0, 48.0, 0.8, 0.0]]), (480, 640))
      .unwrap();
    let a = boxes.xyxyn() as *const Array2<f32>;
    let b = boxes.xyxyn() as *const Array2<f32>;
    assert_eq!(a, b);
    assert_eq!(boxes.xyxyn(), &arr2(&[[0.0, 0.0, 0.1, 0.1]]));
    assert_eq!(boxes.xywhn(), &arr2(&[[0.05, 0.05, 0.1, 0.1]]));
  }

  #[test]
  fn test_select_rebuilds_caches() {
    let boxes = BoxSet::from_rows(
      arr2(&[
        [0.0f32, 0.0, 10.0, 10.0, 0.9, 0.0],
        [20.0, 20.0, 40.0, 60.0, 0.8, 1.0],
      ]),
      (100, 100),
    )
    .unwrap();
    let _ = boxes.xywh();
    let second = boxes.select(1).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.xywh(), &arr2(&[[30.0, 40.0, 20.0, 40.0]]));
  }

  proptest! {
    #[test]
    fn prop_normalized_round_trip(
      x1 in 0.0f32..600.0, y1 in 0.0f32..400.0,
      w in 1.0f32..40.0, h in 1.0f32..80.0,
    ) {
      let (oh, ow) = (480usize, 640usize);
      let boxes = BoxSet::from_rows(
        arr2(&[[x1, y1, x1 + w, y1 + h, 0.5, 0.0]]),
        (oh, ow),
      ).unwrap();
      let n = boxes.xyxyn();
      prop_assert!((n[[0, 0]] * ow as f32 - x1).abs() < 1e-3);
      prop_assert!((n[[0, 1]] * oh as f32 - y1).abs() < 1e-3);
      prop_assert!((n[[0, 2]] * ow as f32 - (x1 + w)).abs() < 1e-3);
      prop_assert!((n[[0, 3]] * oh as f32 - (y1 + h)).abs() < 1e-3);

      let back = ops::xywh_to_xyxy(boxes.xywh().view());
      prop_assert!((back[[0, 0]] - x1).abs() < 1e-3);
      prop_assert!((back[[0, 3]] - (y1 + h)).abs() < 1e-3);

      let wn = boxes.xywhn();
      prop_assert!((wn[[0, 2]] * ow as f32 - w).abs() < 1e-3);
      prop_assert!((wn[[0, 3]] * oh as f32 - h).abs() < 1e-3);
    }
  }
}
