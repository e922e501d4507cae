// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results/probs.rs - 分类概率
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

use ndarray::{Array1, ArrayD, ArrayView1, Ix1};

use crate::{
  results::ResultsError,
  tensor::{Tensor, TensorView},
};

const TOP_K: usize = 5;

/// 每个类别一个概率
#[derive(Debug)]
pub struct ProbabilityVector {
  tensor: Tensor,
  ranking: OnceLock<Vec<usize>>,
}

impl Clone for ProbabilityVector {
  fn clone(&self) -> Self {
    self.with_tensor(self.tensor.clone())
  }
}

impl ProbabilityVector {
  pub fn new(data: ArrayD<f32>, orig_shape: (usize, usize)) -> Result<Self, ResultsError> {
    if data.ndim() != 1 {
      return Err(ResultsError::InvalidShape(format!(
        "分类概率应为一维张量, 实际为 {} 维",
        data.ndim()
      )));
    }
    Ok(Self::from_checked(Tensor::new(data, orig_shape)))
  }

  pub fn from_vec(probs: Vec<f32>, orig_shape: (usize, usize)) -> Self {
    Self::from_checked(Tensor::new(Array1::from_vec(probs).into_dyn(), orig_shape))
  }

  fn from_checked(tensor: Tensor) -> Self {
    Self {
      tensor,
      ranking: OnceLock::new(),
    }
  }

  pub fn data(&self) -> ArrayView1<'_, f32> {
    self
      .tensor
      .data()
      .view()
      .into_dimensionality::<Ix1>()
      .expect("分类概率在构造时已校验为一维")
  }

  /// 前 K 个下标，按概率降序
  fn ranking(&self) -> &[usize] {
    self.ranking.get_or_init(|| {
      let data = self.data();
      let mut idx: Vec<usize> = (0..data.len()).collect();
      idx.sort_by(|&a, &b| data[b].total_cmp(&data[a]));
      idx.truncate(TOP_K);
      idx
    })
  }

  pub fn top1(&self) -> Option<usize> {
    self.ranking().first().copied()
  }

  pub fn top5(&self) -> &[usize] {
    self.ranking()
  }

  pub fn top1conf(&self) -> Option<f32> {
    self.top1().map(|i| self.data()[i])
  }

  pub fn top5conf(&self) -> Vec<f32> {
    let data = self.data();
    self.top5().iter().map(|&i| data[i]).collect()
  }
}

impl TensorView for ProbabilityVector {
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

  #[test]
  fn test_top5_descending() {
    let probs = ProbabilityVector::from_vec(vec![0.05, 0.3, 0.02, 0.25, 0.1, 0.2, 0.08], (1, 1));
    assert_eq!(probs.top5(), &[1, 3, 5, 4, 6]);
    assert_eq!(probs.top1(), Some(1));
    assert_eq!(probs.top1conf(), Some(0.3));
    let conf = probs.top5conf();
    assert!(conf.windows(2).all(|w| w[0] > w[1]));
  }

  #[test]
  fn test_top5_with_fewer_classes() {
    let probs = ProbabilityVector::from_vec(vec![0.2, 0.7, 0.1], (1, 1));
    assert_eq!(probs.top5(), &[1, 0, 2]);
  }

  #[test]
  fn test_empty_vector() {
    let probs = ProbabilityVector::from_vec(vec![], (1, 1));
    assert!(probs.top1().is_none());
    assert!(probs.top5().is_empty());
  }
}
