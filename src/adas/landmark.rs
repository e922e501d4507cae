// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adas/landmark.rs - 场景地标及其候选裁决
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BoxRect;

/// 地标种类。检测框的矩形编码的是场景几何参考，而不是需要上报的目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
  /// 消失线锚点 (VLA)
  VanishLine,
  /// 中央分隔锚点 (DCA)
  CenterDivider,
  /// 消失点锚点 (VPA)
  VanishPoint,
  /// 可行驶区域锚点，近
  DriveNear,
  /// 可行驶区域锚点，中
  DriveMid,
  /// 可行驶区域锚点，远
  DriveFar,
  /// 可行驶区域锚点，超远
  DriveUltraFar,
}

impl LandmarkKind {
  pub const COUNT: usize = 7;

  pub const ALL: [LandmarkKind; Self::COUNT] = [
    LandmarkKind::VanishLine,
    LandmarkKind::CenterDivider,
    LandmarkKind::VanishPoint,
    LandmarkKind::DriveNear,
    LandmarkKind::DriveMid,
    LandmarkKind::DriveFar,
    LandmarkKind::DriveUltraFar,
  ];

  pub fn index(self) -> usize {
    self as usize
  }

  /// 检测模型中对应的默认类别名
  pub fn class_name(self) -> &'static str {
    match self {
      LandmarkKind::VanishLine => "VLA",
      LandmarkKind::CenterDivider => "DCA",
      LandmarkKind::VanishPoint => "VPA",
      LandmarkKind::DriveNear => "DUA_d",
      LandmarkKind::DriveMid => "DUA_m",
      LandmarkKind::DriveFar => "DUA_u",
      LandmarkKind::DriveUltraFar => "DUA_ut",
    }
  }
}

/// 每种地标一个槽位，`None` 表示缺失
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkSet {
  slots: [Option<BoxRect>; LandmarkKind::COUNT],
}

impl LandmarkSet {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn with(mut self, kind: LandmarkKind, rect: BoxRect) -> Self {
    self.set(kind, Some(rect));
    self
  }

  pub fn get(&self, kind: LandmarkKind) -> Option<BoxRect> {
    self.slots[kind.index()]
  }

  pub fn set(&mut self, kind: LandmarkKind, rect: Option<BoxRect>) {
    self.slots[kind.index()] = rect;
  }

  pub fn is_empty(&self) -> bool {
    self.slots.iter().all(Option::is_none)
  }

  pub fn iter(&self) -> impl Iterator<Item = (LandmarkKind, BoxRect)> + '_ {
    LandmarkKind::ALL
      .into_iter()
      .filter_map(|kind| self.get(kind).map(|rect| (kind, rect)))
  }

  pub fn vanish_line(&self) -> Option<BoxRect> {
    self.get(LandmarkKind::VanishLine)
  }
}

/// 逐种类取原始下标最小的候选
///
/// `candidates` 为 `(检测下标, 该检测给出的槽位)`，遍历顺序不影响结果。
pub fn resolve_landmarks<I>(candidates: I) -> LandmarkSet
where
  I: IntoIterator<Item = (usize, LandmarkSet)>,
{
  let mut best: [Option<(usize, BoxRect)>; LandmarkKind::COUNT] = [None; LandmarkKind::COUNT];

  for (index, slots) in candidates {
    for (kind, rect) in slots.iter() {
      let replace = match best[kind.index()] {
        Some((winner, _)) => index < winner,
        None => true,
      };
      if replace {
        best[kind.index()] = Some((index, rect));
      }
    }
  }

  let mut resolved = LandmarkSet::empty();
  for kind in LandmarkKind::ALL {
    if let Some((index, rect)) = best[kind.index()] {
      debug!("地标 {} 由第 {} 个检测提供: {:?}", kind.class_name(), index, rect);
      resolved.set(kind, Some(rect));
    }
  }
  resolved
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rect(v: f32) -> BoxRect {
    BoxRect::new(v, v, v + 10.0, v + 10.0)
  }

  #[test]
  fn test_lowest_index_wins() {
    let candidates = vec![
      (0, LandmarkSet::empty().with(LandmarkKind::CenterDivider, rect(1.0))),
      (1, LandmarkSet::empty().with(LandmarkKind::DriveNear, rect(5.0))),
      (
        2,
        LandmarkSet::empty()
          .with(LandmarkKind::CenterDivider, rect(2.0))
          .with(LandmarkKind::VanishLine, rect(3.0)),
      ),
    ];
    let resolved = resolve_landmarks(candidates.clone());
    assert_eq!(resolved.get(LandmarkKind::CenterDivider), Some(rect(1.0)));
    assert_eq!(resolved.get(LandmarkKind::DriveNear), Some(rect(5.0)));
    assert_eq!(resolved.vanish_line(), Some(rect(3.0)));
    assert_eq!(resolved.get(LandmarkKind::VanishPoint), None);

    // 与遍历顺序无关
    let reversed = resolve_landmarks(candidates.into_iter().rev());
    assert_eq!(reversed, resolved);
  }

  #[test]
  fn test_no_candidates() {
    let resolved = resolve_landmarks(Vec::new());
    assert!(resolved.is_empty());
  }

  #[test]
  fn test_default_class_names_are_distinct() {
    let mut names: Vec<_> = LandmarkKind::ALL.iter().map(|k| k.class_name()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), LandmarkKind::COUNT);
  }
}
