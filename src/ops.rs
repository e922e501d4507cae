// 该文件是 Shanan （山南西风） 项目的一部分。
// src/ops.rs - 坐标变换与掩码轮廓工具
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

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// [x1, y1, x2, y2] -> [cx, cy, w, h]
pub fn xyxy_to_xywh(xyxy: ArrayView2<f32>) -> Array2<f32> {
  let mut out = Array2::zeros(xyxy.raw_dim());
  for (src, mut dst) in xyxy.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
    dst[0] = (src[0] + src[2]) / 2.0;
    dst[1] = (src[1] + src[3]) / 2.0;
    dst[2] = src[2] - src[0];
    dst[3] = src[3] - src[1];
  }
  out
}

/// [cx, cy, w, h] -> [x1, y1, x2, y2]
pub fn xywh_to_xyxy(xywh: ArrayView2<f32>) -> Array2<f32> {
  let mut out = Array2::zeros(xywh.raw_dim());
  for (src, mut dst) in xywh.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
    dst[0] = src[0] - src[2] / 2.0;
    dst[1] = src[1] - src[3] / 2.0;
    dst[2] = src[0] + src[2] / 2.0;
    dst[3] = src[1] + src[3] / 2.0;
  }
  out
}

/// 将前四列（xyxy）裁剪到 (height, width) 范围内
pub fn clip_boxes(boxes: &mut Array2<f32>, shape: (usize, usize)) {
  let (h, w) = (shape.0 as f32, shape.1 as f32);
  for mut row in boxes.axis_iter_mut(Axis(0)) {
    row[0] = row[0].clamp(0.0, w);
    row[1] = row[1].clamp(0.0, h);
    row[2] = row[2].clamp(0.0, w);
    row[3] = row[3].clamp(0.0, h);
  }
}

/// letterbox 缩放参数：(gain, pad_x, pad_y)，gain = 模型尺寸 / 原始尺寸
pub fn letterbox_params(model_shape: (usize, usize), orig_shape: (usize, usize)) -> (f32, f32, f32) {
  let (mh, mw) = (model_shape.0 as f32, model_shape.1 as f32);
  let (oh, ow) = (orig_shape.0 as f32, orig_shape.1 as f32);
  if oh <= 0.0 || ow <= 0.0 {
    return (1.0, 0.0, 0.0);
  }
  let gain = (mh / oh).min(mw / ow);
  let pad_x = (mw - ow * gain) / 2.0;
  let pad_y = (mh - oh * gain) / 2.0;
  (gain, pad_x, pad_y)
}

/// 将模型分辨率下的 (n, 2) 点坐标映射回原始帧，可选归一化
pub fn scale_coords(
  model_shape: (usize, usize),
  coords: ArrayView2<f32>,
  orig_shape: (usize, usize),
  normalize: bool,
) -> Array2<f32> {
  let (gain, pad_x, pad_y) = letterbox_params(model_shape, orig_shape);
  let (h, w) = (orig_shape.0 as f32, orig_shape.1 as f32);
  let mut out = coords.to_owned();
  for mut p in out.axis_iter_mut(Axis(0)) {
    let mut x = ((p[0] - pad_x) / gain).clamp(0.0, w);
    let mut y = ((p[1] - pad_y) / gain).clamp(0.0, h);
    if normalize {
      x /= w;
      y /= h;
    }
    p[0] = x;
    p[1] = y;
  }
  out
}

/// 每个掩码取点数最多的外轮廓，返回 (n, 2) 的像素坐标；空掩码返回 (0, 2)
pub fn masks_to_segments(masks: ArrayView3<f32>) -> Vec<Array2<f32>> {
  masks
    .axis_iter(Axis(0))
    .map(|mask| {
      let (h, w) = mask.dim();
      // 四周补一像素背景，贴边的前景才会被识别为外轮廓
      let image = GrayImage::from_fn(w as u32 + 2, h as u32 + 2, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if x >= 1 && y >= 1 && x <= w && y <= h && mask[[y - 1, x - 1]] > 0.5 {
          Luma([255u8])
        } else {
          Luma([0u8])
        }
      });

      let largest = find_contours::<i32>(&image)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .max_by_key(|c| c.points.len());

      match largest {
        Some(contour) => {
          let mut segment = Array2::zeros((contour.points.len(), 2));
          for (i, p) in contour.points.iter().enumerate() {
            segment[[i, 0]] = (p.x - 1) as f32;
            segment[[i, 1]] = (p.y - 1) as f32;
          }
          segment
        }
        None => Array2::zeros((0, 2)),
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array3, arr2};

  #[test]
  fn test_xyxy_xywh_inverse() {
    let xyxy = arr2(&[[10.0f32, 20.0, 50.0, 80.0]]);
    let xywh = xyxy_to_xywh(xyxy.view());
    assert_eq!(xywh, arr2(&[[30.0, 50.0, 40.0, 60.0]]));
    assert_eq!(xywh_to_xyxy(xywh.view()), xyxy);
  }

  #[test]
  fn test_clip_boxes() {
    let mut b = arr2(&[[-5.0f32, 10.0, 700.0, 500.0, 0.9, 1.0]]);
    clip_boxes(&mut b, (480, 640));
    assert_eq!(b, arr2(&[[0.0, 10.0, 640.0, 480.0, 0.9, 1.0]]));
  }

  #[test]
  fn test_scale_coords_letterbox() {
    // 640x480 的帧被 letterbox 到 640x640，上下各填充 80
    let coords = arr2(&[[320.0f32, 80.0], [640.0, 560.0]]);
    let px = scale_coords((640, 640), coords.view(), (480, 640), false);
    assert_eq!(px, arr2(&[[320.0, 0.0], [640.0, 480.0]]));
    let n = scale_coords((640, 640), coords.view(), (480, 640), true);
    assert_eq!(n, arr2(&[[0.5, 0.0], [1.0, 1.0]]));
  }

  #[test]
  fn test_masks_to_segments_picks_outer_contour() {
    let mut masks = Array3::<f32>::zeros((2, 10, 10));
    for y in 2..6 {
      for x in 3..8 {
        masks[[0, y, x]] = 1.0;
      }
    }
    let segments = masks_to_segments(masks.view());
    assert_eq!(segments.len(), 2);
    let seg = &segments[0];
    assert!(seg.nrows() > 0);
    for p in seg.axis_iter(Axis(0)) {
      assert!((3.0..=7.0).contains(&p[0]));
      assert!((2.0..=5.0).contains(&p[1]));
    }
    assert_eq!(segments[1].nrows(), 0);
  }

  #[test]
  fn test_masks_to_segments_edge_touching_mask() {
    // 前景贴住左上角与底边
    let mut masks = Array3::<f32>::zeros((2, 8, 8));
    for y in 0..4 {
      for x in 0..4 {
        masks[[0, y, x]] = 1.0;
      }
    }
    for y in 5..8 {
      for x in 0..8 {
        masks[[1, y, x]] = 1.0;
      }
    }
    let segments = masks_to_segments(masks.view());

    let corner = &segments[0];
    assert!(corner.nrows() > 0);
    let xs: Vec<f32> = corner.column(0).to_vec();
    let ys: Vec<f32> = corner.column(1).to_vec();
    assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), 0.0);
    assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 3.0);
    assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), 0.0);
    assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 3.0);

    let bottom = &segments[1];
    assert!(bottom.nrows() > 0);
    for p in bottom.axis_iter(Axis(0)) {
      assert!((0.0..=7.0).contains(&p[0]));
      assert!((5.0..=7.0).contains(&p[1]));
    }
  }
}
