// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adas.rs - 辅助驾驶叠加层
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
use tracing::debug;

use crate::{
  config::AdasConfig,
  plot::{Annotator, BoxLabel},
};

mod corridor;
mod departure;
mod history;
mod landmark;

pub use self::corridor::{KeyPair, KeyPoints, LANE_SOURCES, LaneCorridor, center_line, lane_bounds_at};
pub use self::departure::{DepartureDecision, DepartureState};
pub use self::history::VanishLineHistory;
pub use self::landmark::{LandmarkKind, LandmarkSet, resolve_landmarks};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
  pub from: Point,
  pub to: Point,
}

/// 像素坐标矩形 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRect {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoxRect {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn left_corner(&self) -> Point {
    Point::new(self.x1, self.y1)
  }

  pub fn right_corner(&self) -> Point {
    Point::new(self.x2, self.y2)
  }

  pub fn center_x(&self) -> f32 {
    (self.x1 + self.x2) / 2.0
  }

  pub fn bottom_mid(&self) -> Point {
    Point::new(self.center_x(), self.y2)
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }
}

/// FCW 标注对单个检测的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcwLevel {
  /// 地标类检测，不参与
  Skipped,
  OutOfLane,
  InLane,
  Warning,
}

/// 一帧叠加的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct AdasReport {
  pub landmarks: LandmarkSet,
  pub corridor: LaneCorridor,
  /// 本帧 FCW 使用的参考行，`None` 表示整帧跳过了 FCW
  pub reference_row: Option<f32>,
  /// 按检测原始顺序
  pub fcw: Vec<FcwLevel>,
  pub departure: Option<DepartureDecision>,
  pub segments_drawn: usize,
}

/// 地标解析、走廊重建与偏离判定的逐帧流水线，持有跨帧的消失线记录
#[derive(Debug, Clone, Default)]
pub struct AdasOverlay {
  config: AdasConfig,
  history: VanishLineHistory,
}

impl AdasOverlay {
  pub fn new(config: AdasConfig) -> Self {
    Self {
      config,
      history: VanishLineHistory::new(),
    }
  }

  pub fn config(&self) -> &AdasConfig {
    &self.config
  }

  pub fn history(&self) -> &VanishLineHistory {
    &self.history
  }

  pub fn reset(&mut self) {
    self.history.reset();
  }

  /// 绘制顺序：检测框 → FCW → 消失线 → 左/中/右车道线 → 中心参考线 → 偏离告警
  pub fn render<A: Annotator>(&mut self, annotator: &mut A, labels: &[BoxLabel]) -> AdasReport {
    // 逆序绘制，原始顺序靠前的检测位于上层
    let mut candidates = Vec::new();
    for (index, label) in labels.iter().enumerate().rev() {
      let slots = annotator.box_label(label);
      if !slots.is_empty() {
        candidates.push((index, slots));
      }
    }
    let landmarks = resolve_landmarks(candidates);
    self.history.observe(landmarks.vanish_line());

    let corridor = LaneCorridor::from_landmarks(&landmarks);

    let reference_row = self.history.reference_row();
    let fcw = match reference_row {
      Some(row) => {
        let mut levels: Vec<FcwLevel> = labels
          .iter()
          .rev()
          .map(|label| annotator.box_fcw_label(label, &corridor.key_points, row))
          .collect();
        levels.reverse();
        levels
      }
      None => {
        debug!("尚无消失线记录，跳过 FCW 标注");
        Vec::new()
      }
    };

    let segments_drawn = corridor.draw(annotator, &self.config);

    let (w, h) = annotator.dimensions();
    if self.config.draw_center_line {
      let seg = center_line(w, h, self.config.center_line_span);
      annotator.line(
        seg.from,
        seg.to,
        Rgb(self.config.colors.center_line),
        self.config.lane_thickness,
      );
    }

    let departure = if self.config.draw_ldws {
      DepartureDecision::decide(corridor.near_pair(), w, self.config.departure_ratio)
    } else {
      None
    };
    if let Some(decision) = &departure {
      decision.draw(annotator, &self.config);
    }

    AdasReport {
      landmarks,
      corridor,
      reference_row,
      fcw,
      departure,
      segments_drawn,
    }
  }
}
