// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 张量视图
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

use std::ops::Range;

use half::f16;
use ndarray::{ArrayD, Axis, Slice};
use tracing::debug;

/// 张量所在设备
///
/// 实际的内存搬运由外部运行时负责，这里只记录目标设备。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Npu(u32),
}

/// 张量数值精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
  #[default]
  F32,
  F16,
}

/// 不可变的数值缓冲区，附带原始帧尺寸 (height, width)
#[derive(Debug, Clone)]
pub struct Tensor {
  data: ArrayD<f32>,
  orig_shape: (usize, usize),
  device: Device,
  precision: Precision,
}

impl Tensor {
  pub fn new(data: ArrayD<f32>, orig_shape: (usize, usize)) -> Self {
    Self {
      data,
      orig_shape,
      device: Device::Cpu,
      precision: Precision::F32,
    }
  }

  pub fn data(&self) -> &ArrayD<f32> {
    &self.data
  }

  pub fn shape(&self) -> &[usize] {
    self.data.shape()
  }

  pub fn orig_shape(&self) -> (usize, usize) {
    self.orig_shape
  }

  pub fn device(&self) -> Device {
    self.device
  }

  pub fn precision(&self) -> Precision {
    self.precision
  }

  /// 第一维长度，零维张量视为单个元素
  pub fn len(&self) -> usize {
    if self.data.ndim() == 0 {
      1
    } else {
      self.data.len_of(Axis(0))
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn to_device(&self, device: Device) -> Self {
    debug!("张量迁移: {:?} -> {:?}", self.device, device);
    Self {
      device,
      ..self.clone()
    }
  }

  pub fn cpu(&self) -> Self {
    self.to_device(Device::Cpu)
  }

  pub fn to_precision(&self, precision: Precision) -> Self {
    let data = match precision {
      Precision::F16 => self.data.mapv(|v| f16::from_f32(v).to_f32()),
      Precision::F32 => self.data.clone(),
    };
    Self {
      data,
      orig_shape: self.orig_shape,
      device: self.device,
      precision,
    }
  }

  /// 取第 `idx` 行，保留第一维（结果长度为 1）
  pub fn select(&self, idx: usize) -> Option<Self> {
    if self.data.ndim() == 0 || idx >= self.len() {
      return None;
    }
    Some(self.slice(idx..idx + 1))
  }

  pub fn slice(&self, range: Range<usize>) -> Self {
    let end = range.end.min(self.len());
    let start = range.start.min(end);
    let data = if self.data.ndim() == 0 {
      self.data.clone()
    } else {
      self
        .data
        .slice_axis(Axis(0), Slice::from(start..end))
        .to_owned()
    };
    Self {
      data,
      orig_shape: self.orig_shape,
      device: self.device,
      precision: self.precision,
    }
  }
}

/// 帧级批量迁移操作，由 [`crate::results::ResultFrame`] 统一下发给各个集合
#[derive(Debug, Clone, PartialEq)]
pub enum Transfer {
  Device(Device),
  Precision(Precision),
  Select(usize),
  Slice(Range<usize>),
}

/// 构建在 [`Tensor`] 上的派生集合
///
/// 迁移操作总是返回新实例，派生缓存随新实例重新开始。
pub trait TensorView: Sized {
  fn tensor(&self) -> &Tensor;

  /// 用已经校验过形状的张量重建同类集合
  fn with_tensor(&self, tensor: Tensor) -> Self;

  fn len(&self) -> usize {
    self.tensor().len()
  }

  fn is_empty(&self) -> bool {
    self.tensor().is_empty()
  }

  fn shape(&self) -> &[usize] {
    self.tensor().shape()
  }

  fn orig_shape(&self) -> (usize, usize) {
    self.tensor().orig_shape()
  }

  fn to_device(&self, device: Device) -> Self {
    self.with_tensor(self.tensor().to_device(device))
  }

  fn cpu(&self) -> Self {
    self.with_tensor(self.tensor().cpu())
  }

  fn to_precision(&self, precision: Precision) -> Self {
    self.with_tensor(self.tensor().to_precision(precision))
  }

  fn select(&self, idx: usize) -> Option<Self> {
    self.tensor().select(idx).map(|t| self.with_tensor(t))
  }

  fn slice(&self, range: Range<usize>) -> Self {
    self.with_tensor(self.tensor().slice(range))
  }

  fn transfer(&self, op: &Transfer) -> Option<Self> {
    match op {
      Transfer::Device(device) => Some(self.to_device(*device)),
      Transfer::Precision(precision) => Some(self.to_precision(*precision)),
      Transfer::Select(idx) => self.select(*idx),
      Transfer::Slice(range) => Some(self.slice(range.clone())),
    }
  }
}
