// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 绘制与叠加层配置
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
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::adas::LandmarkKind;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {0}: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Parse(#[from] serde_json::Error),
}

/// 叠加层颜色 (RGB)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayColors {
  pub vanish_line: [u8; 3],
  pub left_line: [u8; 3],
  pub middle_line: [u8; 3],
  pub right_line: [u8; 3],
  pub center_line: [u8; 3],
  pub warning: [u8; 3],
}

impl Default for OverlayColors {
  fn default() -> Self {
    Self {
      vanish_line: [200, 0, 255],
      left_line: [0, 255, 127],
      middle_line: [0, 127, 255],
      right_line: [255, 127, 0],
      center_line: [0, 255, 255],
      warning: [255, 0, 0],
    }
  }
}

/// 辅助驾驶叠加层配置
///
/// 默认值与车载标定时使用的常量一致，按相机几何调整时只改配置文件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdasConfig {
  pub draw_vanish_line: bool,
  pub draw_left_line: bool,
  pub draw_middle_line: bool,
  pub draw_right_line: bool,
  pub draw_center_line: bool,
  pub draw_ldws: bool,
  pub draw_vanish_point: bool,
  /// 偏离阈值 = 近端车道宽度 / ratio
  pub departure_ratio: f32,
  /// 中心参考线上下端占画面高度的比例
  pub center_line_span: [f32; 2],
  /// 告警文字位置占画面宽、高的比例
  pub warning_anchor: [f32; 2],
  pub warning_text: String,
  pub warning_font_size: f32,
  /// 低于参考行的深度比例达到该值且位于本车道内时触发 FCW
  pub fcw_proximity: f32,
  pub lane_thickness: u32,
  pub thin_thickness: u32,
  /// 类别名 -> 地标种类
  pub landmark_classes: BTreeMap<String, LandmarkKind>,
  pub colors: OverlayColors,
}

impl Default for AdasConfig {
  fn default() -> Self {
    Self {
      draw_vanish_line: true,
      draw_left_line: true,
      draw_middle_line: true,
      draw_right_line: true,
      draw_center_line: true,
      draw_ldws: true,
      draw_vanish_point: false,
      departure_ratio: 3.5,
      center_line_span: [0.80, 0.99],
      warning_anchor: [1.0 / 8.0, 1.0 / 4.0],
      warning_text: "DEPARTURE WARNING !".to_string(),
      warning_font_size: 36.0,
      fcw_proximity: 0.6,
      lane_thickness: 2,
      thin_thickness: 1,
      landmark_classes: LandmarkKind::ALL
        .iter()
        .map(|k| (k.class_name().to_string(), *k))
        .collect(),
      colors: OverlayColors::default(),
    }
  }
}

impl AdasConfig {
  pub fn landmark_kind(&self, class_name: &str) -> Option<LandmarkKind> {
    self.landmark_classes.get(class_name).copied()
  }
}

/// 单帧绘制选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
  /// 标签中显示置信度
  pub conf: bool,
  pub labels: bool,
  pub boxes: bool,
  pub masks: bool,
  pub probs: bool,
  /// 为空时按画面尺寸估算
  pub line_width: Option<u32>,
  pub font_size: Option<f32>,
  /// TrueType 字体路径，未配置时不绘制文字
  pub font_path: Option<PathBuf>,
  pub kpt_radius: i32,
  pub kpt_line: bool,
  pub mask_alpha: f32,
  pub adas: AdasConfig,
}

impl Default for PlotConfig {
  fn default() -> Self {
    Self {
      conf: true,
      labels: true,
      boxes: true,
      masks: true,
      probs: true,
      line_width: None,
      font_size: None,
      font_path: None,
      kpt_radius: 5,
      kpt_line: true,
      mask_alpha: 0.5,
      adas: AdasConfig::default(),
    }
  }
}

impl PlotConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text =
      std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config: PlotConfig = serde_json::from_str(&text)?;
    info!("已加载绘制配置: {}", path.display());
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_calibration_constants() {
    let config = AdasConfig::default();
    assert_eq!(config.departure_ratio, 3.5);
    assert_eq!(config.center_line_span, [0.80, 0.99]);
    assert_eq!(config.warning_anchor, [0.125, 0.25]);
    assert!(!config.draw_vanish_point);
    assert_eq!(config.landmark_kind("DCA"), Some(LandmarkKind::CenterDivider));
    assert_eq!(config.landmark_kind("car"), None);
  }

  #[test]
  fn test_partial_json_keeps_defaults() {
    let config: PlotConfig = serde_json::from_str(
      r#"{ "conf": false, "adas": { "departure_ratio": 4.0, "draw_vanish_point": true } }"#,
    )
    .unwrap();
    assert!(!config.conf);
    assert!(config.labels);
    assert_eq!(config.adas.departure_ratio, 4.0);
    assert!(config.adas.draw_vanish_point);
    assert_eq!(config.adas.lane_thickness, 2);
  }

  #[test]
  fn test_landmark_classes_override() {
    let config: AdasConfig =
      serde_json::from_str(r#"{ "landmark_classes": { "vanish": "vanish_line" } }"#).unwrap();
    assert_eq!(config.landmark_kind("vanish"), Some(LandmarkKind::VanishLine));
    assert_eq!(config.landmark_kind("VLA"), None);
  }
}
