// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存叠加结果图像
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, plot::PlotOutput, results::ResultFrame};

pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<ResultFrame, PlotOutput> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, _frame: &ResultFrame, result: &PlotOutput) -> Result<(), Self::Error> {
    self.save_image(&result.image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use std::collections::BTreeMap;

  #[test]
  fn test_save_creates_parent() {
    let dir = std::env::temp_dir().join(format!("shanan-adas-image-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("nested").join("out.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    let frame = ResultFrame::new(RgbImage::new(8, 8), "a.png", BTreeMap::new());
    let result = PlotOutput {
      image: RgbImage::from_pixel(8, 8, Rgb([7, 7, 7])),
      aux_maps: Default::default(),
      report: None,
    };
    output.render_result(&frame, &result).unwrap();
    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(*saved.get_pixel(3, 3), Rgb([7, 7, 7]));
  }

  #[test]
  fn test_scheme_mismatch() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
