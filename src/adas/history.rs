// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adas/history.rs - 跨帧消失线记录
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

use tracing::debug;

use super::BoxRect;

/// 最近一次解析成功的消失线锚点
///
/// 当前帧没有消失线时沿用旧值，不设过期时间。
#[derive(Debug, Clone, Default)]
pub struct VanishLineHistory {
  last: Option<BoxRect>,
  stale_frames: u64,
}

impl VanishLineHistory {
  pub fn new() -> Self {
    Self::default()
  }

  /// 每帧调用一次：有值则覆盖，没有则保留旧值
  pub fn observe(&mut self, current: Option<BoxRect>) {
    match current {
      Some(rect) => {
        self.last = Some(rect);
        self.stale_frames = 0;
      }
      None => {
        if self.last.is_some() {
          self.stale_frames += 1;
          debug!("本帧无消失线，沿用 {} 帧前的记录", self.stale_frames);
        }
      }
    }
  }

  pub fn get(&self) -> Option<BoxRect> {
    self.last
  }

  /// FCW 标注使用的参考行（消失线左端点的 y）
  pub fn reference_row(&self) -> Option<f32> {
    self.last.map(|r| r.y1)
  }

  /// 连续沿用旧值的帧数
  pub fn stale_frames(&self) -> u64 {
    self.stale_frames
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_and_replace() {
    let r1 = BoxRect::new(100.0, 200.0, 500.0, 210.0);
    let r2 = BoxRect::new(90.0, 180.0, 520.0, 190.0);
    let mut history = VanishLineHistory::new();
    assert!(history.reference_row().is_none());

    history.observe(Some(r1));
    history.observe(None);
    history.observe(None);
    assert_eq!(history.get(), Some(r1));
    assert_eq!(history.stale_frames(), 2);

    history.observe(Some(r2));
    assert_eq!(history.get(), Some(r2));
    assert_eq!(history.reference_row(), Some(180.0));
    assert_eq!(history.stale_frames(), 0);

    history.reset();
    assert!(history.get().is_none());
  }
}
