// 该文件是 Shanan （山南西风） 项目的一部分。
// src/plot/draw.rs - 基于 RgbImage 的默认绘图实现
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

use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size},
  rect::Rect,
};
use ndarray::{ArrayView2, ArrayView3, Axis};
use tracing::{debug, warn};

use super::{Annotator, BoxLabel, Palette, SKELETON};
use crate::{
  adas::{BoxRect, FcwLevel, KeyPoints, LandmarkSet, Point, lane_bounds_at},
  config::PlotConfig,
  ops::letterbox_params,
  results::KEYPOINT_VISIBLE_THRESHOLD,
};

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 2;
const MASK_THRESHOLD: f32 = 0.5;
const POSE_KEYPOINTS: usize = 17;

/// 在原图副本上绘制，绘制完成后通过 [`ImageAnnotator::into_image`] 取出
pub struct ImageAnnotator {
  image: RgbImage,
  config: Arc<PlotConfig>,
  font: Option<FontArc>,
  palette: Palette,
  line_width: u32,
  font_size: f32,
}

impl ImageAnnotator {
  pub fn new(image: RgbImage, config: Arc<PlotConfig>, font: Option<FontArc>) -> Self {
    let (w, h) = image.dimensions();
    let mean_side = (w + h) as f32 / 2.0;
    let line_width = config
      .line_width
      .unwrap_or_else(|| ((mean_side * 0.003).round() as u32).max(2));
    let font_size = config
      .font_size
      .unwrap_or_else(|| (mean_side * 0.035).round().max(12.0));
    Self {
      image,
      config,
      font,
      palette: Palette::new(),
      line_width,
      font_size,
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn line_width(&self) -> u32 {
    self.line_width
  }

  fn is_landmark(&self, label: &BoxLabel) -> bool {
    self.config.adas.landmark_kind(&label.class_name).is_some()
  }

  /// 像素坐标矩形转为画面内的整数边界，退化矩形返回 `None`
  fn clamp_rect(&self, rect: BoxRect) -> Option<(i32, i32, i32, i32)> {
    let (w, h) = (self.image.width() as i32, self.image.height() as i32);
    if w == 0 || h == 0 {
      return None;
    }
    let x_min = (rect.x1.floor() as i32).clamp(0, w - 1);
    let y_min = (rect.y1.floor() as i32).clamp(0, h - 1);
    let x_max = (rect.x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (rect.y2.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return None;
    }
    Some((x_min, y_min, x_max, y_max))
  }

  /// 向内加粗的矩形边框
  fn draw_rect(&mut self, rect: BoxRect, color: Rgb<u8>, thickness: u32) {
    let Some((x_min, y_min, x_max, y_max)) = self.clamp_rect(rect) else {
      return;
    };
    for t in 0..thickness as i32 {
      let (x0, y0) = (x_min + t, y_min + t);
      let (x1, y1) = (x_max - t, y_max - t);
      if x0 > x1 || y0 > y1 {
        break;
      }
      for x in x0..=x1 {
        self.image.put_pixel(x as u32, y0 as u32, color);
        self.image.put_pixel(x as u32, y1 as u32, color);
      }
      for y in y0..=y1 {
        self.image.put_pixel(x0 as u32, y as u32, color);
        self.image.put_pixel(x1 as u32, y as u32, color);
      }
    }
  }

  /// 在框上方绘制带背景的标签，上方空间不足时放在框内
  fn draw_label(&mut self, rect: BoxRect, text: &str, color: Rgb<u8>) {
    let Some(font) = &self.font else {
      debug!("未加载字体，跳过标签: {}", text);
      return;
    };
    let Some((x_min, y_min, _, _)) = self.clamp_rect(rect) else {
      return;
    };
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, text);
    let label_h = text_h as i32 + 2 * LABEL_PADDING;
    let label_y = if y_min >= label_h { y_min - label_h } else { y_min };

    let max_width = (self.image.width() as i32 - x_min).max(0) as u32;
    let label_w = (text_w + 2 * LABEL_PADDING as u32).min(max_width);
    if label_w == 0 {
      return;
    }
    let background = Rect::at(x_min, label_y).of_size(label_w, label_h as u32);
    draw_filled_rect_mut(&mut self.image, background, color);
    draw_text_mut(
      &mut self.image,
      LABEL_TEXT_COLOR,
      x_min + LABEL_PADDING,
      label_y + LABEL_PADDING,
      scale,
      font,
      text,
    );
  }

  fn point_visible(&self, kpts: ArrayView2<f32>, index: usize) -> Option<(f32, f32)> {
    let row = kpts.row(index);
    let (x, y) = (row[0], row[1]);
    if row.len() == 3 && row[2] < KEYPOINT_VISIBLE_THRESHOLD {
      return None;
    }
    // 被置零的不可见点
    if x <= 0.0 || y <= 0.0 {
      return None;
    }
    let (w, h) = self.dimensions();
    if x >= w as f32 || y >= h as f32 {
      return None;
    }
    Some((x, y))
  }
}

impl Annotator for ImageAnnotator {
  fn box_label(&mut self, label: &BoxLabel) -> LandmarkSet {
    if let Some(kind) = self.config.adas.landmark_kind(&label.class_name) {
      return LandmarkSet::empty().with(kind, label.rect);
    }
    self.draw_rect(label.rect, label.color, self.line_width);
    if let Some(text) = &label.text {
      self.draw_label(label.rect, text, label.color);
    }
    LandmarkSet::empty()
  }

  fn box_fcw_label(&mut self, label: &BoxLabel, key_points: &KeyPoints, reference_row: f32) -> FcwLevel {
    if self.is_landmark(label) {
      return FcwLevel::Skipped;
    }
    let bottom = label.rect.bottom_mid();
    if bottom.y <= reference_row {
      return FcwLevel::OutOfLane;
    }
    let Some((left, right)) = lane_bounds_at(key_points, bottom.y) else {
      return FcwLevel::OutOfLane;
    };
    if bottom.x < left || bottom.x > right {
      return FcwLevel::OutOfLane;
    }

    let (_, h) = self.dimensions();
    let depth = h as f32 - reference_row;
    let proximity = if depth > 0.0 {
      ((bottom.y - reference_row) / depth).clamp(0.0, 1.0)
    } else {
      1.0
    };

    if proximity >= self.config.adas.fcw_proximity {
      let color = Rgb(self.config.adas.colors.warning);
      warn!(
        "前向碰撞预警: 第 {} 个检测 {}, 接近度 {:.2}",
        label.index, label.class_name, proximity
      );
      self.draw_rect(label.rect, color, self.line_width * 2);
      self.draw_label(label.rect, &format!("FCW {:.2}", proximity), color);
      FcwLevel::Warning
    } else {
      let rect = label.rect;
      self.line(
        Point::new(rect.x1, rect.y2),
        Point::new(rect.x2, rect.y2),
        label.color,
        self.line_width,
      );
      let caption = format!("{:.2}", proximity);
      let size = self.font_size;
      self.text((rect.x1 as i32, rect.y2 as i32), &caption, label.color, size);
      FcwLevel::InLane
    }
  }

  fn masks(&mut self, masks: ArrayView3<f32>, colors: &[Rgb<u8>], alpha: f32) {
    if colors.is_empty() {
      return;
    }
    let (_, mh, mw) = masks.dim();
    let (w, h) = self.image.dimensions();
    let (gain, pad_x, pad_y) = letterbox_params((mh, mw), (h as usize, w as usize));
    let alpha = alpha.clamp(0.0, 1.0);

    for (i, mask) in masks.axis_iter(Axis(0)).enumerate() {
      let Rgb(color) = colors[i % colors.len()];
      for y in 0..h {
        let my = (y as f32 * gain + pad_y) as usize;
        if my >= mh {
          continue;
        }
        for x in 0..w {
          let mx = (x as f32 * gain + pad_x) as usize;
          if mx >= mw || mask[[my, mx]] <= MASK_THRESHOLD {
            continue;
          }
          let pixel = self.image.get_pixel_mut(x, y);
          for c in 0..3 {
            let blended = pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
            pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
          }
        }
      }
    }
  }

  fn kpts(&mut self, kpts: ArrayView2<f32>, radius: i32, kpt_line: bool) {
    let (nkpt, _) = kpts.dim();
    let is_pose = nkpt == POSE_KEYPOINTS;

    for i in 0..nkpt {
      let Some((x, y)) = self.point_visible(kpts, i) else {
        continue;
      };
      let color = if is_pose {
        self.palette.kpt_color(i)
      } else {
        self.palette.color(i)
      };
      draw_filled_circle_mut(&mut self.image, (x as i32, y as i32), radius, color);
    }

    if !(kpt_line && is_pose) {
      return;
    }
    for (i, [a, b]) in SKELETON.iter().copied().enumerate() {
      let (Some(from), Some(to)) = (self.point_visible(kpts, a), self.point_visible(kpts, b)) else {
        continue;
      };
      let color = self.palette.limb_color(i);
      self.line(Point::new(from.0, from.1), Point::new(to.0, to.1), color, 2);
    }
  }

  fn text(&mut self, pos: (i32, i32), text: &str, color: Rgb<u8>, size: f32) {
    let Some(font) = &self.font else {
      debug!("未加载字体，跳过文字: {}", text);
      return;
    };
    draw_text_mut(&mut self.image, color, pos.0, pos.1, PxScale::from(size), font, text);
  }

  /// 沿法线方向平移若干条单像素线段实现加粗
  fn line(&mut self, from: Point, to: Point, color: Rgb<u8>, thickness: u32) {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let length = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if length > f32::EPSILON {
      (-dy / length, dx / length)
    } else {
      (0.0, 0.0)
    };
    let thickness = thickness.max(1);
    let center = (thickness - 1) as f32 / 2.0;
    for t in 0..thickness {
      let offset = t as f32 - center;
      draw_line_segment_mut(
        &mut self.image,
        (from.x + nx * offset, from.y + ny * offset),
        (to.x + nx * offset, to.y + ny * offset),
        color,
      );
    }
  }

  fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  fn font_size(&self) -> f32 {
    self.font_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adas::{KeyPair, LandmarkKind};
  use ndarray::{Array3, arr2};

  fn annotator(w: u32, h: u32) -> ImageAnnotator {
    ImageAnnotator::new(RgbImage::new(w, h), Arc::new(PlotConfig::default()), None)
  }

  fn label(class_name: &str, rect: BoxRect) -> BoxLabel {
    BoxLabel {
      index: 0,
      rect,
      class_name: class_name.to_string(),
      text: Some(format!("{} 0.90", class_name)),
      color: Rgb([10, 200, 30]),
    }
  }

  fn corridor() -> KeyPoints {
    let mut key_points = [None; 5];
    key_points[1] = Some(KeyPair {
      left: Point::new(100.0, 400.0),
      right: Point::new(540.0, 400.0),
    });
    key_points[3] = Some(KeyPair {
      left: Point::new(260.0, 250.0),
      right: Point::new(380.0, 250.0),
    });
    key_points
  }

  #[test]
  fn test_default_sizes_follow_frame() {
    let a = annotator(640, 480);
    assert_eq!(a.line_width(), 2);
    assert_eq!(a.font_size(), 20.0);
    let a = annotator(1280, 720);
    assert_eq!(a.line_width(), 3);
  }

  #[test]
  fn test_landmark_is_returned_not_drawn() {
    let mut a = annotator(640, 480);
    let rect = BoxRect::new(10.0, 20.0, 600.0, 30.0);
    let slots = a.box_label(&label("VLA", rect));
    assert_eq!(slots.get(LandmarkKind::VanishLine), Some(rect));
    assert!(a.image().pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn test_regular_box_is_drawn() {
    let mut a = annotator(640, 480);
    let slots = a.box_label(&label("car", BoxRect::new(10.0, 20.0, 100.0, 120.0)));
    assert!(slots.is_empty());
    assert_eq!(*a.image().get_pixel(50, 20), Rgb([10, 200, 30]));
    assert_eq!(*a.image().get_pixel(50, 70), Rgb([0, 0, 0]));
  }

  #[test]
  fn test_fcw_levels() {
    let mut a = annotator(640, 480);
    let key_points = corridor();
    let reference_row = 200.0;

    let landmark = label("DUA_d", BoxRect::new(100.0, 380.0, 540.0, 400.0));
    assert_eq!(a.box_fcw_label(&landmark, &key_points, reference_row), FcwLevel::Skipped);

    let far = label("car", BoxRect::new(290.0, 240.0, 350.0, 300.0));
    assert_eq!(a.box_fcw_label(&far, &key_points, reference_row), FcwLevel::InLane);

    let near = label("car", BoxRect::new(250.0, 380.0, 390.0, 460.0));
    assert_eq!(a.box_fcw_label(&near, &key_points, reference_row), FcwLevel::Warning);

    let aside = label("car", BoxRect::new(0.0, 380.0, 60.0, 460.0));
    assert_eq!(a.box_fcw_label(&aside, &key_points, reference_row), FcwLevel::OutOfLane);

    let above = label("car", BoxRect::new(300.0, 100.0, 340.0, 150.0));
    assert_eq!(a.box_fcw_label(&above, &key_points, reference_row), FcwLevel::OutOfLane);
  }

  #[test]
  fn test_mask_blend() {
    let mut a = annotator(4, 4);
    let mut masks = Array3::<f32>::zeros((1, 4, 4));
    masks[[0, 1, 1]] = 1.0;
    a.masks(masks.view(), &[Rgb([200, 100, 0])], 0.5);
    assert_eq!(*a.image().get_pixel(1, 1), Rgb([100, 50, 0]));
    assert_eq!(*a.image().get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn test_hidden_keypoints_skipped() {
    let mut a = annotator(64, 64);
    let kpts = arr2(&[[0.0f32, 0.0, 0.2], [32.0, 32.0, 0.9]]);
    a.kpts(kpts.view(), 2, true);
    assert_ne!(*a.image().get_pixel(32, 32), Rgb([0, 0, 0]));
    assert_eq!(*a.image().get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn test_thick_line() {
    let mut a = annotator(32, 32);
    a.line(Point::new(0.0, 16.0), Point::new(31.0, 16.0), Rgb([255, 0, 0]), 3);
    assert_eq!(*a.image().get_pixel(10, 15), Rgb([255, 0, 0]));
    assert_eq!(*a.image().get_pixel(10, 17), Rgb([255, 0, 0]));
    assert_eq!(*a.image().get_pixel(10, 20), Rgb([0, 0, 0]));
  }
}
