// 该文件是 Shanan （山南西风） 项目的一部分。
// src/plot/palette.rs - 类别颜色表
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

use image::Rgb;

const PALETTE_SIZE: usize = 80;

/// 人体姿态关键点与骨架配色
const POSE_PALETTE: [[u8; 3]; 20] = [
  [255, 128, 0],
  [255, 153, 51],
  [255, 178, 102],
  [230, 230, 0],
  [255, 153, 255],
  [153, 204, 255],
  [255, 102, 255],
  [255, 51, 255],
  [102, 178, 255],
  [51, 153, 255],
  [255, 153, 153],
  [255, 102, 102],
  [255, 51, 51],
  [153, 255, 153],
  [102, 255, 102],
  [51, 255, 51],
  [0, 255, 0],
  [0, 0, 255],
  [255, 0, 0],
  [255, 255, 255],
];

const KPT_COLOR_INDEX: [usize; 17] = [16, 16, 16, 16, 16, 0, 0, 0, 0, 0, 0, 9, 9, 9, 9, 9, 9];
const LIMB_COLOR_INDEX: [usize; 19] = [9, 9, 9, 9, 7, 7, 7, 0, 0, 0, 0, 0, 16, 16, 16, 16, 16, 16, 16];

/// COCO 17 点骨架，下标从 0 开始
pub const SKELETON: [[usize; 2]; 19] = [
  [15, 13],
  [13, 11],
  [16, 14],
  [14, 12],
  [11, 12],
  [5, 11],
  [6, 12],
  [5, 6],
  [5, 7],
  [6, 8],
  [7, 9],
  [8, 10],
  [1, 2],
  [0, 1],
  [0, 2],
  [1, 3],
  [2, 4],
  [3, 5],
  [4, 6],
];

/// 按类别编号循环取色
#[derive(Debug, Clone)]
pub struct Palette {
  colors: Vec<Rgb<u8>>,
}

impl Default for Palette {
  fn default() -> Self {
    Self::new()
  }
}

impl Palette {
  pub fn new() -> Self {
    // 色相均匀分布的 80 种颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();
    Self { colors }
  }

  pub fn color(&self, cls: usize) -> Rgb<u8> {
    self.colors[cls % self.colors.len()]
  }

  pub fn kpt_color(&self, index: usize) -> Rgb<u8> {
    Rgb(POSE_PALETTE[KPT_COLOR_INDEX[index % KPT_COLOR_INDEX.len()]])
  }

  pub fn limb_color(&self, index: usize) -> Rgb<u8> {
    Rgb(POSE_PALETTE[LIMB_COLOR_INDEX[index % LIMB_COLOR_INDEX.len()]])
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_palette_wraps() {
    let palette = Palette::new();
    assert_eq!(palette.color(3), palette.color(83));
    assert_ne!(palette.color(0), palette.color(40));
  }

  #[test]
  fn test_hue_zero_is_red() {
    let Rgb([r, g, b]) = hsv_to_rgb(0.0, 0.8, 0.9);
    assert!(r > g && r > b);
  }
}
