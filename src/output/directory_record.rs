// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  plot::PlotOutput,
  results::{ResultFrame, ResultsError},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不支持的记录格式: {0}")]
  UnknownRecordFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("导出检测结果错误: {0}")]
  ResultsError(#[from] ResultsError),
}

/// 与叠加图一起保存的检测结果格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  Json,
  Txt,
}

/// `folder:///dir?record=json|txt&crop&always`
///
/// 图像按 `年/月/日/时-分-秒-序号.png` 保存，默认只保存有检测的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<RecordFormat>,
  crop: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut record = None;
    for (k, v) in uri.query_pairs() {
      if k == "record" {
        record = match v.as_ref() {
          "json" => Some(RecordFormat::Json),
          "txt" => Some(RecordFormat::Txt),
          other => {
            return Err(DirectoryRecordOutputError::UnknownRecordFormat(
              other.to_string(),
            ));
          }
        };
        break;
      }
    }

    let crop = uri.query_pairs().any(|(k, _)| k == "crop");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      crop,
      always,
      frame_counter: AtomicU16::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<ResultFrame, PlotOutput> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ResultFrame, result: &PlotOutput) -> Result<(), Self::Error> {
    if !self.always && frame.is_empty() {
      debug!("无检测结果，跳过记录");
      return Ok(());
    }

    let path = self.frame_path()?;
    result.image.save(&path)?;

    match self.record {
      Some(RecordFormat::Json) => {
        if let Some(json) = frame.to_json(false)? {
          std::fs::write(path.with_extension("json"), json)?;
        }
      }
      Some(RecordFormat::Txt) => frame.save_txt(path.with_extension("txt"), true)?,
      None => {}
    }

    if self.crop
      && let (Some(parent), Some(name)) = (path.parent(), path.file_name())
    {
      frame.save_crop(parent.join("crops"), name)?;
    }

    debug!("已记录: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use ndarray::arr2;
  use std::collections::BTreeMap;

  fn files_with_extension(dir: &std::path::Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        found.extend(files_with_extension(&path, ext));
      } else if path.extension().is_some_and(|e| e == ext) {
        found.push(path);
      }
    }
    found
  }

  fn plot_output() -> PlotOutput {
    PlotOutput {
      image: RgbImage::from_pixel(64, 48, Rgb([5, 5, 5])),
      aux_maps: Default::default(),
      report: None,
    }
  }

  #[test]
  fn test_records_json_and_crops() {
    let dir = std::env::temp_dir().join(format!("shanan-adas-folder-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let url = url::Url::parse(&format!("folder://{}?record=json&crop", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let empty = ResultFrame::new(RgbImage::new(64, 48), "a.png", BTreeMap::new());
    output.render_result(&empty, &plot_output()).unwrap();
    assert!(!dir.exists());

    let frame = ResultFrame::new(RgbImage::new(64, 48), "a.png", BTreeMap::new())
      .with_boxes(arr2(&[[4.0f32, 4.0, 30.0, 30.0, 0.9, 0.0]]).into_dyn())
      .unwrap();
    output.render_result(&frame, &plot_output()).unwrap();
    assert_eq!(files_with_extension(&dir, "png").len(), 1);
    assert_eq!(files_with_extension(&dir, "json").len(), 1);
    assert_eq!(files_with_extension(&dir, "jpg").len(), 1);
  }

  #[test]
  fn test_unknown_record_format() {
    let url = url::Url::parse("folder:///tmp/out?record=xml").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::UnknownRecordFormat(_))
    ));
  }
}
