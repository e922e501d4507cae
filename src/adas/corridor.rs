// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adas/corridor.rs - 车道走廊重建
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

use super::{LandmarkKind, LandmarkSet, Point, Segment};
use crate::{config::AdasConfig, plot::Annotator};

/// 由近到远的车道关键点来源
pub const LANE_SOURCES: [LandmarkKind; 5] = [
  LandmarkKind::CenterDivider,
  LandmarkKind::DriveNear,
  LandmarkKind::DriveMid,
  LandmarkKind::DriveFar,
  LandmarkKind::DriveUltraFar,
];

/// 同一距离带上的左右边界点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPair {
  pub left: Point,
  pub right: Point,
}

impl KeyPair {
  pub fn width(&self) -> f32 {
    (self.right.x - self.left.x).abs()
  }

  pub fn center_x(&self) -> f32 {
    (self.left.x + self.right.x) / 2.0
  }
}

/// p1..p5，由近到远，缺失为 `None`
pub type KeyPoints = [Option<KeyPair>; 5];

#[derive(Debug, Clone, PartialEq)]
pub struct LaneCorridor {
  pub vanish_line: Option<Segment>,
  pub key_points: KeyPoints,
  /// 每个关键点来源矩形底边中点
  pub middle: [Option<Point>; 5],
  pub vanishing_point: Option<Point>,
}

fn chain(points: [Option<Point>; 5]) -> [Option<Segment>; 4] {
  std::array::from_fn(|i| match (points[i], points[i + 1]) {
    (Some(from), Some(to)) => Some(Segment { from, to }),
    _ => None,
  })
}

impl LaneCorridor {
  pub fn from_landmarks(landmarks: &LandmarkSet) -> Self {
    let vla = landmarks.get(LandmarkKind::VanishLine);
    let vpa = landmarks.get(LandmarkKind::VanishPoint);

    let key_points = LANE_SOURCES.map(|kind| {
      landmarks.get(kind).map(|r| KeyPair {
        left: r.left_corner(),
        right: r.right_corner(),
      })
    });
    let middle = LANE_SOURCES.map(|kind| landmarks.get(kind).map(|r| r.bottom_mid()));

    let vanishing_point = match (vla, vpa) {
      (Some(vla), Some(vpa)) => Some(Point::new(vpa.center_x(), vla.y1)),
      _ => None,
    };

    Self {
      vanish_line: vla.map(|r| Segment {
        from: r.left_corner(),
        to: r.right_corner(),
      }),
      key_points,
      middle,
      vanishing_point,
    }
  }

  pub fn near_pair(&self) -> Option<KeyPair> {
    self.key_points[0]
  }

  pub fn left_segments(&self) -> [Option<Segment>; 4] {
    chain(self.key_points.map(|p| p.map(|p| p.left)))
  }

  pub fn right_segments(&self) -> [Option<Segment>; 4] {
    chain(self.key_points.map(|p| p.map(|p| p.right)))
  }

  pub fn middle_segments(&self) -> [Option<Segment>; 4] {
    chain(self.middle)
  }

  /// 从最远的可用关键点（p5，缺失时退到 p4）连到消失点的左、中、右三条射线
  pub fn vanishing_rays(&self) -> [Option<Segment>; 3] {
    let Some(vp) = self.vanishing_point else {
      return [None; 3];
    };
    let (pair, mid) = match (self.key_points[4], self.key_points[3]) {
      (Some(p5), _) => (Some(p5), self.middle[4]),
      (None, Some(p4)) => (Some(p4), self.middle[3]),
      _ => (None, None),
    };
    let to_vp = |from: Point| Segment { from, to: vp };
    [
      pair.map(|p| to_vp(p.left)),
      mid.map(to_vp),
      pair.map(|p| to_vp(p.right)),
    ]
  }

  /// 按 消失线 → 左/中（逐段交替） → 左/中射线 → 右 → 右射线 的顺序绘制，返回实际绘制的线段数
  pub fn draw<A: Annotator>(&self, annotator: &mut A, config: &AdasConfig) -> usize {
    let colors = &config.colors;
    let mut drawn = 0;
    let mut draw_one = |annotator: &mut A, segment: Option<Segment>, color: [u8; 3], thickness: u32| {
      if let Some(seg) = segment {
        annotator.line(seg.from, seg.to, Rgb(color), thickness);
        drawn += 1;
      }
    };

    if config.draw_vanish_line {
      draw_one(annotator, self.vanish_line, colors.vanish_line, config.thin_thickness);
    }

    let left = self.left_segments();
    let middle = self.middle_segments();
    for (l, m) in left.into_iter().zip(middle) {
      if config.draw_left_line {
        draw_one(annotator, l, colors.left_line, config.lane_thickness);
      }
      if config.draw_middle_line {
        draw_one(annotator, m, colors.middle_line, config.lane_thickness);
      }
    }

    let [left_ray, middle_ray, right_ray] = if config.draw_vanish_point {
      self.vanishing_rays()
    } else {
      [None; 3]
    };
    if config.draw_left_line {
      draw_one(annotator, left_ray, colors.left_line, config.thin_thickness);
    }
    if config.draw_middle_line {
      draw_one(annotator, middle_ray, colors.middle_line, config.thin_thickness);
    }

    if config.draw_right_line {
      for r in self.right_segments() {
        draw_one(annotator, r, colors.right_line, config.lane_thickness);
      }
      draw_one(annotator, right_ray, colors.right_line, config.thin_thickness);
    }
    drawn
  }
}

/// 由近到远排列的边界点在 `y` 行上的横坐标
///
/// 低于最近点时沿用最近点，高于最远点时视为走廊之外。
fn boundary_x(points: &[Point], y: f32) -> Option<f32> {
  let nearest = points.first()?;
  if y >= nearest.y {
    return Some(nearest.x);
  }
  points.windows(2).find_map(|pair| {
    let (near, far) = (pair[0], pair[1]);
    if y > near.y || y < far.y {
      return None;
    }
    let span = near.y - far.y;
    if span.abs() < f32::EPSILON {
      return Some(near.x);
    }
    let t = (near.y - y) / span;
    Some(near.x + (far.x - near.x) * t)
  })
}

/// 走廊在 `y` 行上的左右边界
pub fn lane_bounds_at(key_points: &KeyPoints, y: f32) -> Option<(f32, f32)> {
  let left: Vec<Point> = key_points.iter().flatten().map(|p| p.left).collect();
  let right: Vec<Point> = key_points.iter().flatten().map(|p| p.right).collect();
  let l = boundary_x(&left, y)?;
  let r = boundary_x(&right, y)?;
  Some((l.min(r), l.max(r)))
}

/// 画面水平中心的竖直参考线，与检测无关
pub fn center_line(width: u32, height: u32, span: [f32; 2]) -> Segment {
  let x = width as f32 / 2.0;
  let h = height as f32;
  Segment {
    from: Point::new(x, h * span[0]),
    to: Point::new(x, h * span[1]),
  }
}
