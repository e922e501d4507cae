// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 检测结果输入
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

use thiserror::Error;

use crate::{FromUrl, results::ResultFrame};

#[cfg(feature = "detection_record")]
mod detection_record;
#[cfg(feature = "detection_record")]
pub use self::detection_record::{
  DetectionRecord, DetectionRecordInput, DetectionRecordInputError, DetectionRecordIter, FrameRecord,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "detection_record")]
  #[error("检测记录输入错误: {0}")]
  DetectionRecordInputError(#[from] DetectionRecordInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "detection_record")]
  DetectionRecord(DetectionRecordInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "detection_record")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == DetectionRecordInput::SCHEME {
        let input = DetectionRecordInput::from_url(url)?;
        return Ok(InputWrapper::DetectionRecord(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl IntoIterator for InputWrapper {
  type Item = ResultFrame;
  type IntoIter = InputWrapperIter;

  fn into_iter(self) -> Self::IntoIter {
    match self {
      #[cfg(feature = "detection_record")]
      InputWrapper::DetectionRecord(input) => InputWrapperIter::DetectionRecord(input.into_iter()),
    }
  }
}

pub enum InputWrapperIter {
  #[cfg(feature = "detection_record")]
  DetectionRecord(DetectionRecordIter),
}

impl Iterator for InputWrapperIter {
  type Item = ResultFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "detection_record")]
      InputWrapperIter::DetectionRecord(input) => input.next(),
    }
  }
}
