// 该文件是 Shanan （山南西风） 项目的一部分。
// src/plot.rs - 检测结果绘制
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
  convert::Infallible,
  path::{Path, PathBuf},
  sync::Arc,
};

use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayView3, Axis};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  adas::{AdasOverlay, AdasReport, BoxRect, FcwLevel, KeyPoints, LandmarkSet, Point, VanishLineHistory},
  config::PlotConfig,
  results::{AuxMaps, ResultFrame},
  tensor::TensorView,
};

mod draw;
mod palette;

pub use self::draw::ImageAnnotator;
pub use self::palette::{Palette, SKELETON};

#[derive(Error, Debug)]
pub enum PlotError {
  #[error("无法读取字体文件 {0}: {1}")]
  FontIo(PathBuf, std::io::Error),
  #[error("字体文件格式无效: {0}")]
  InvalidFont(PathBuf),
}

/// 单个检测的绘制请求
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLabel {
  /// 检测在 BoxSet 中的原始下标
  pub index: usize,
  pub rect: BoxRect,
  pub class_name: String,
  /// 标签文字，`None` 表示不绘制标签
  pub text: Option<String>,
  pub color: Rgb<u8>,
}

/// 绘图能力
///
/// 叠加层只依赖这组操作；`box_label` 与 `box_fcw_label` 同时负责识别地标类检测。
pub trait Annotator {
  /// 绘制检测框；地标类检测不绘制，返回对应槽位
  fn box_label(&mut self, label: &BoxLabel) -> LandmarkSet;

  /// 前向碰撞标注，`reference_row` 为消失线所在行
  fn box_fcw_label(&mut self, label: &BoxLabel, key_points: &KeyPoints, reference_row: f32) -> FcwLevel;

  /// `masks` 形状为 (n, h, w)，`colors` 与掩码一一对应
  fn masks(&mut self, masks: ArrayView3<f32>, colors: &[Rgb<u8>], alpha: f32);

  /// 单个实例的关键点，形状 (k, 2|3)
  fn kpts(&mut self, kpts: ArrayView2<f32>, radius: i32, kpt_line: bool);

  fn text(&mut self, pos: (i32, i32), text: &str, color: Rgb<u8>, size: f32);

  fn line(&mut self, from: Point, to: Point, color: Rgb<u8>, thickness: u32);

  /// (width, height)
  fn dimensions(&self) -> (u32, u32);

  fn font_size(&self) -> f32;
}

/// 一帧绘制结果，辅助分割图原样透传
#[derive(Debug, Clone)]
pub struct PlotOutput {
  pub image: RgbImage,
  pub aux_maps: AuxMaps,
  pub report: Option<AdasReport>,
}

/// 将一帧检测结果转换为可输出的内容
pub trait Overlay {
  type Output;
  type Error;

  fn overlay(&mut self, frame: &ResultFrame) -> Result<Self::Output, Self::Error>;
}

/// 默认绘制器，持有跨帧的叠加层状态
#[derive(Debug)]
pub struct Plotter {
  config: Arc<PlotConfig>,
  overlay: AdasOverlay,
  palette: Palette,
  font: Option<FontArc>,
}

fn load_font(path: &Path) -> Result<FontArc, PlotError> {
  let data = std::fs::read(path).map_err(|e| PlotError::FontIo(path.to_path_buf(), e))?;
  FontArc::try_from_vec(data).map_err(|_| PlotError::InvalidFont(path.to_path_buf()))
}

impl Plotter {
  pub fn new(config: PlotConfig) -> Result<Self, PlotError> {
    let font = match &config.font_path {
      Some(path) => {
        let font = load_font(path)?;
        info!("已加载字体: {}", path.display());
        Some(font)
      }
      None => {
        info!("未配置字体，跳过文字绘制");
        None
      }
    };
    Ok(Self {
      overlay: AdasOverlay::new(config.adas.clone()),
      config: Arc::new(config),
      palette: Palette::new(),
      font,
    })
  }

  pub fn config(&self) -> &PlotConfig {
    &self.config
  }

  pub fn history(&self) -> &VanishLineHistory {
    self.overlay.history()
  }

  /// 切换到新的视频流时清空跨帧记录
  pub fn reset(&mut self) {
    self.overlay.reset();
  }

  pub fn annotator(&self, frame: &ResultFrame) -> ImageAnnotator {
    ImageAnnotator::new(
      frame.orig_img.as_ref().clone(),
      self.config.clone(),
      self.font.clone(),
    )
  }

  /// 检测框标签，顺序与 BoxSet 一致
  pub fn labels(&self, frame: &ResultFrame) -> Vec<BoxLabel> {
    let Some(boxes) = &frame.boxes else {
      return Vec::new();
    };
    boxes
      .iter()
      .map(|row| {
        let class_name = frame.class_name(row.cls);
        let text = self.config.labels.then(|| {
          let mut text = String::new();
          if let Some(id) = row.id {
            text.push_str(&format!("id:{} ", id));
          }
          text.push_str(&class_name);
          if self.config.conf {
            text.push_str(&format!(" {:.2}", row.conf));
          }
          text
        });
        BoxLabel {
          index: row.index,
          rect: row.rect,
          class_name,
          text,
          color: self.palette.color(row.cls),
        }
      })
      .collect()
  }

  pub fn plot(&mut self, frame: &ResultFrame) -> PlotOutput {
    let mut annotator = self.annotator(frame);
    let report = self.plot_with(&mut annotator, frame);
    PlotOutput {
      image: annotator.into_image(),
      aux_maps: frame.aux_maps.clone(),
      report,
    }
  }

  /// 绘制顺序：掩码 → 检测框与叠加层 → 分类结果 → 关键点
  pub fn plot_with<A: Annotator>(&mut self, annotator: &mut A, frame: &ResultFrame) -> Option<AdasReport> {
    if self.config.masks
      && let Some(masks) = &frame.masks
    {
      let colors: Vec<Rgb<u8>> = match &frame.boxes {
        Some(boxes) => boxes.iter().map(|row| self.palette.color(row.cls)).collect(),
        None => (0..masks.len()).map(|i| self.palette.color(i)).collect(),
      };
      annotator.masks(masks.data(), &colors, self.config.mask_alpha);
    }

    let report = match &frame.boxes {
      Some(boxes) if self.config.boxes && !boxes.is_empty() => {
        let labels = self.labels(frame);
        Some(self.overlay.render(annotator, &labels))
      }
      _ => {
        debug!("无检测框，跳过叠加层");
        None
      }
    };

    if self.config.probs
      && let Some(probs) = &frame.probs
    {
      let (_, h) = annotator.dimensions();
      let x = (h as f32 * 0.03).round() as i32;
      let size = annotator.font_size();
      for (line, (cls, conf)) in probs.top5().iter().zip(probs.top5conf()).enumerate() {
        let text = format!("{} {:.2}", frame.class_name(*cls), conf);
        let y = x + (line as f32 * size * 1.2) as i32;
        annotator.text((x, y), &text, Rgb([255, 255, 255]), size);
      }
    }

    if let Some(keypoints) = &frame.keypoints {
      for kpts in keypoints.data().axis_iter(Axis(0)).rev() {
        annotator.kpts(kpts, self.config.kpt_radius, self.config.kpt_line);
      }
    }

    report
  }
}

impl Overlay for Plotter {
  type Output = PlotOutput;
  type Error = Infallible;

  fn overlay(&mut self, frame: &ResultFrame) -> Result<Self::Output, Self::Error> {
    Ok(self.plot(frame))
  }
}
