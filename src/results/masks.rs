// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results/masks.rs - 分割掩码集合
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

use ndarray::{Array2, ArrayD, ArrayView3, Axis, Ix3};

use crate::{
  ops,
  results::ResultsError,
  tensor::{Tensor, TensorView},
};

/// 模型分辨率下的二值掩码，形状 (n, h, w)
#[derive(Debug)]
pub struct MaskSet {
  tensor: Tensor,
  xy: OnceLock<Vec<Array2<f32>>>,
  xyn: OnceLock<Vec<Array2<f32>>>,
}

impl Clone for MaskSet {
  fn clone(&self) -> Self {
    self.with_tensor(self.tensor.clone())
  }
}

impl MaskSet {
  pub fn new(data: ArrayD<f32>, orig_shape: (usize, usize)) -> Result<Self, ResultsError> {
    let data = match data.ndim() {
      2 => data.insert_axis(Axis(0)),
      3 => data,
      n => {
        return Err(ResultsError::InvalidShape(format!(
          "掩码应为二维或三维张量, 实际为 {} 维",
          n
        )));
      }
    };
    Ok(Self::from_checked(Tensor::new(data, orig_shape)))
  }

  fn from_checked(tensor: Tensor) -> Self {
    Self {
      tensor,
      xy: OnceLock::new(),
      xyn: OnceLock::new(),
    }
  }

  pub fn data(&self) -> ArrayView3<'_, f32> {
    self
      .tensor
      .data()
      .view()
      .into_dimensionality::<Ix3>()
      .expect("掩码在构造时已校验为三维")
  }

  /// 掩码自身的分辨率 (h, w)
  pub fn mask_shape(&self) -> (usize, usize) {
    let (_, h, w) = self.data().dim();
    (h, w)
  }

  fn segments(&self, normalize: bool) -> Vec<Array2<f32>> {
    let model_shape = self.mask_shape();
    let orig_shape = self.tensor.orig_shape();
    ops::masks_to_segments(self.data())
      .iter()
      .map(|seg| ops::scale_coords(model_shape, seg.view(), orig_shape, normalize))
      .collect()
  }

  /// 像素坐标下的轮廓
  pub fn xy(&self) -> &[Array2<f32>] {
    self.xy.get_or_init(|| self.segments(false))
  }

  /// 归一化轮廓
  pub fn xyn(&self) -> &[Array2<f32>] {
    self.xyn.get_or_init(|| self.segments(true))
  }
}

impl TensorView for MaskSet {
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
  use ndarray::Array2 as A2;

  #[test]
  fn test_single_mask_promoted_and_rescaled() {
    // 8x8 掩码对应 16x16 原图，前景位于左上角 4x4
    let mut mask = A2::<f32>::zeros((8, 8));
    for y in 0..4 {
      for x in 0..4 {
        mask[[y, x]] = 1.0;
      }
    }
    let masks = MaskSet::new(mask.into_dyn(), (16, 16)).unwrap();
    assert_eq!(masks.len(), 1);

    let xy = &masks.xy()[0];
    assert!(xy.nrows() > 0);
    let max_x = xy.column(0).iter().cloned().fold(f32::MIN, f32::max);
    assert_eq!(max_x, 6.0);

    let xyn = &masks.xyn()[0];
    for v in xyn.iter() {
      assert!((0.0..=1.0).contains(v));
    }
  }

  #[test]
  fn test_rejects_bad_rank() {
    let v = ndarray::Array1::<f32>::zeros(4).into_dyn();
    assert!(MaskSet::new(v, (4, 4)).is_err());
  }
}
