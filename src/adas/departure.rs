// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adas/departure.rs - 车道偏离判定 (LDWS)
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
use tracing::{debug, info};

use super::KeyPair;
use crate::{config::AdasConfig, plot::Annotator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureState {
  Nominal,
  Warning,
}

/// 单帧判定结果，不跨帧保留
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepartureDecision {
  pub threshold: f32,
  pub lane_center_x: f32,
  pub distance: f32,
  pub state: DepartureState,
}

impl DepartureDecision {
  /// 近端关键点 p1 缺失时不做判定
  pub fn decide(near: Option<KeyPair>, frame_width: u32, ratio: f32) -> Option<Self> {
    let near = near?;
    let threshold = near.width() / ratio;
    let lane_center_x = near.center_x();
    let distance = (lane_center_x - frame_width as f32 / 2.0).abs();
    let state = if distance > threshold {
      DepartureState::Warning
    } else {
      DepartureState::Nominal
    };
    debug!(
      "偏离判定: 阈值 {:.2}, 车道中心 {:.1}, 偏离 {:.1}, 状态 {:?}",
      threshold, lane_center_x, distance, state
    );
    Some(Self {
      threshold,
      lane_center_x,
      distance,
      state,
    })
  }

  pub fn is_warning(&self) -> bool {
    self.state == DepartureState::Warning
  }

  /// 告警时在固定位置绘制提示文字
  pub fn draw<A: Annotator>(&self, annotator: &mut A, config: &AdasConfig) {
    if !self.is_warning() {
      return;
    }
    let (w, h) = annotator.dimensions();
    let x = (w as f32 * config.warning_anchor[0]) as i32;
    let y = (h as f32 * config.warning_anchor[1]) as i32;
    info!("车道偏离告警: 偏离 {:.1} > 阈值 {:.2}", self.distance, self.threshold);
    annotator.text(
      (x, y),
      &config.warning_text,
      Rgb(config.colors.warning),
      config.warning_font_size,
    );
  }
}
