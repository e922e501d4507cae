// 该文件是 Shanan （山南西风） 项目的一部分。
// src/results/export.rs - 检测结果导出（文本、JSON、裁剪图）
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
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use image::{RgbImage, imageops};
use ndarray::Axis;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ResultFrame, ResultsError};
use crate::{adas::BoxRect, tensor::TensorView};

const CROP_GAIN: f32 = 1.02;
const CROP_PAD: f32 = 10.0;

#[derive(Debug, Serialize)]
struct JsonBox {
  x1: f32,
  y1: f32,
  x2: f32,
  y2: f32,
}

#[derive(Debug, Serialize)]
struct JsonPoints {
  x: Vec<f32>,
  y: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct JsonKeypoints {
  x: Vec<f32>,
  y: Vec<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  visible: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct JsonDetection {
  name: String,
  class: usize,
  confidence: f32,
  #[serde(rename = "box")]
  bbox: JsonBox,
  #[serde(skip_serializing_if = "Option::is_none")]
  track_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  segments: Option<JsonPoints>,
  #[serde(skip_serializing_if = "Option::is_none")]
  keypoints: Option<JsonKeypoints>,
}

/// 文件已存在时在文件名后追加 2、3、4…
pub fn increment_path(path: &Path) -> PathBuf {
  if !path.exists() {
    return path.to_path_buf();
  }
  let stem = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();
  let suffix = path
    .extension()
    .map(|e| format!(".{}", e.to_string_lossy()))
    .unwrap_or_default();
  let parent = path.parent().unwrap_or_else(|| Path::new(""));
  (2..)
    .map(|n| parent.join(format!("{}{}{}", stem, n, suffix)))
    .find(|candidate| !candidate.exists())
    .unwrap_or_else(|| path.to_path_buf())
}

/// 按比例放大并外扩后裁剪检测框所在区域
pub fn crop_box(image: &RgbImage, rect: BoxRect) -> Option<RgbImage> {
  let (cx, cy) = ((rect.x1 + rect.x2) / 2.0, (rect.y1 + rect.y2) / 2.0);
  let w = rect.width() * CROP_GAIN + CROP_PAD;
  let h = rect.height() * CROP_GAIN + CROP_PAD;
  let (img_w, img_h) = (image.width() as f32, image.height() as f32);
  let x1 = (cx - w / 2.0).clamp(0.0, img_w) as u32;
  let y1 = (cy - h / 2.0).clamp(0.0, img_h) as u32;
  let x2 = (cx + w / 2.0).clamp(0.0, img_w) as u32;
  let y2 = (cy + h / 2.0).clamp(0.0, img_h) as u32;
  if x2 <= x1 || y2 <= y1 {
    return None;
  }
  Some(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

fn push_values(line: &mut Vec<String>, values: impl IntoIterator<Item = f32>) {
  line.extend(values.into_iter().map(|v| v.to_string()));
}

impl ResultFrame {
  /// 每个检测一行追加写入文本文件
  ///
  /// 分类结果写 top5 的 `概率 类别名`；检测结果写 `类别 xywhn`，有掩码时换成归一化轮廓，
  /// 其后依次是关键点、置信度（`save_conf`）与跟踪编号。
  pub fn save_txt(&self, txt_file: impl AsRef<Path>, save_conf: bool) -> Result<(), ResultsError> {
    let txt_file = txt_file.as_ref();
    let mut texts = Vec::new();

    if let Some(probs) = &self.probs {
      let data = probs.data();
      for &j in probs.top5() {
        texts.push(format!("{:.2} {}", data[j], self.class_name(j)));
      }
    } else if let Some(boxes) = &self.boxes {
      let xywhn = boxes.xywhn();
      let segments = self.masks.as_ref().map(|m| m.xyn());
      let keypoints = self.keypoints.as_ref();

      for row in boxes.iter() {
        let j = row.index;
        let mut line = vec![row.cls.to_string()];
        match segments.and_then(|s| s.get(j)) {
          Some(seg) => push_values(&mut line, seg.iter().copied()),
          None => push_values(&mut line, xywhn.row(j).iter().copied()),
        }
        if let Some(kpts) = keypoints
          && j < kpts.len()
        {
          let xyn = kpts.xyn();
          let conf = kpts.conf();
          let nkpt = xyn.shape()[1];
          for k in 0..nkpt {
            line.push(xyn[[j, k, 0]].to_string());
            line.push(xyn[[j, k, 1]].to_string());
            if let Some(conf) = conf {
              line.push(conf[[j, k]].to_string());
            }
          }
        }
        if save_conf {
          line.push(row.conf.to_string());
        }
        if let Some(id) = row.id {
          line.push(id.to_string());
        }
        texts.push(line.join(" "));
      }
    }

    if texts.is_empty() {
      return Ok(());
    }
    if let Some(parent) = txt_file.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(txt_file)?;
    for text in texts {
      writeln!(file, "{}", text)?;
    }
    debug!("检测结果已写入: {}", txt_file.display());
    Ok(())
  }

  /// 将每个检测框裁剪保存到 `save_dir/<类别名>/<file_name 主名>.jpg`
  pub fn save_crop(&self, save_dir: impl AsRef<Path>, file_name: impl AsRef<Path>) -> Result<(), ResultsError> {
    if self.probs.is_some() {
      warn!("分类结果不支持 save_crop");
      return Ok(());
    }
    let Some(boxes) = &self.boxes else {
      return Ok(());
    };
    let stem = file_name
      .as_ref()
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "im".to_string());

    for row in boxes.iter() {
      let Some(crop) = crop_box(&self.orig_img, row.rect) else {
        debug!("第 {} 个检测框裁剪区域为空", row.index);
        continue;
      };
      let dir = save_dir.as_ref().join(self.class_name(row.cls));
      std::fs::create_dir_all(&dir)?;
      let path = increment_path(&dir.join(format!("{}.jpg", stem)));
      crop.save(&path)?;
      debug!("裁剪图已保存: {}", path.display());
    }
    Ok(())
  }

  /// 检测结果的 JSON 列表，`normalize` 时坐标除以画面宽高
  ///
  /// 分类结果不支持，返回 `Ok(None)`。
  pub fn to_json(&self, normalize: bool) -> Result<Option<String>, ResultsError> {
    if self.probs.is_some() {
      warn!("分类结果不支持 to_json");
      return Ok(None);
    }
    let (h, w) = if normalize {
      (self.orig_shape.0 as f32, self.orig_shape.1 as f32)
    } else {
      (1.0, 1.0)
    };

    let mut detections = Vec::new();
    if let Some(boxes) = &self.boxes {
      for row in boxes.iter() {
        let i = row.index;
        let segments = self.masks.as_ref().and_then(|m| m.xy().get(i)).map(|seg| JsonPoints {
          x: seg.column(0).iter().map(|x| x / w).collect(),
          y: seg.column(1).iter().map(|y| y / h).collect(),
        });
        let keypoints = self.keypoints.as_ref().and_then(|kpts| {
          let data = kpts.data();
          if i >= data.len_of(Axis(0)) {
            return None;
          }
          let points = data.index_axis(Axis(0), i);
          Some(JsonKeypoints {
            x: points.column(0).iter().map(|x| x / w).collect(),
            y: points.column(1).iter().map(|y| y / h).collect(),
            visible: kpts.has_visible().then(|| points.column(2).to_vec()),
          })
        });
        detections.push(JsonDetection {
          name: self.class_name(row.cls),
          class: row.cls,
          confidence: row.conf,
          bbox: JsonBox {
            x1: row.rect.x1 / w,
            y1: row.rect.y1 / h,
            x2: row.rect.x2 / w,
            y2: row.rect.y2 / h,
          },
          track_id: row.id,
          segments,
          keypoints,
        });
      }
    }
    Ok(Some(serde_json::to_string_pretty(&detections)?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use ndarray::{arr1, arr2, arr3};
  use std::collections::BTreeMap;

  fn names() -> BTreeMap<usize, String> {
    [(0usize, "car".to_string()), (1, "person".to_string())]
      .into_iter()
      .collect()
  }

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shanan-adas-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  fn detection_frame() -> ResultFrame {
    ResultFrame::new(RgbImage::from_pixel(200, 100, Rgb([9, 9, 9])), "a.jpg", names())
      .with_boxes(arr2(&[[20.0f32, 10.0, 60.0, 50.0, 0.5, 1.0]]).into_dyn())
      .unwrap()
  }

  #[test]
  fn test_save_txt_detection_line() {
    let dir = scratch_dir("txt");
    let file = dir.join("labels").join("a.txt");
    detection_frame().save_txt(&file, true).unwrap();
    let text = std::fs::read_to_string(&file).unwrap();
    assert_eq!(text, "1 0.2 0.3 0.2 0.4 0.5\n");
    // 追加写入
    detection_frame().save_txt(&file, false).unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap().lines().count(), 2);
  }

  #[test]
  fn test_save_txt_classification() {
    let dir = scratch_dir("cls");
    let file = dir.join("a.txt");
    ResultFrame::new(RgbImage::new(4, 4), "a.jpg", names())
      .with_probs(arr1(&[0.25f32, 0.75]).into_dyn())
      .unwrap()
      .save_txt(&file, false)
      .unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "0.75 person\n0.25 car\n");
  }

  #[test]
  fn test_to_json_fields() {
    let frame = detection_frame()
      .with_keypoints(arr3(&[[[30.0f32, 20.0, 0.9], [40.0, 30.0, 0.1]]]).into_dyn())
      .unwrap();
    let json = frame.to_json(true).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let det = &value[0];
    assert_eq!(det["name"], "person");
    assert_eq!(det["class"], 1);
    assert_eq!(det["box"]["x1"], 0.1);
    assert!(det.get("track_id").is_none());
    assert_eq!(det["keypoints"]["x"][1], 0.0);
    assert_eq!(det["keypoints"]["visible"].as_array().unwrap().len(), 2);
    assert!(json.contains("\n  {"));
  }

  #[test]
  fn test_classification_json_unsupported() {
    let frame = ResultFrame::new(RgbImage::new(4, 4), "a.jpg", names())
      .with_probs(arr1(&[0.25f32, 0.75]).into_dyn())
      .unwrap();
    assert!(frame.to_json(false).unwrap().is_none());
  }

  #[test]
  fn test_save_crop_increments_name() {
    let dir = scratch_dir("crop");
    let frame = detection_frame();
    frame.save_crop(&dir, "a.jpg").unwrap();
    frame.save_crop(&dir, "a.jpg").unwrap();
    assert!(dir.join("person").join("a.jpg").exists());
    assert!(dir.join("person").join("a2.jpg").exists());
    let crop = image::open(dir.join("person").join("a.jpg")).unwrap();
    // 40 * 1.02 + 10 = 50.8，两端坐标取整后为 14..65
    assert_eq!(crop.width(), 51);
  }

  #[test]
  fn test_crop_box_clipped() {
    let image = RgbImage::new(100, 100);
    let crop = crop_box(&image, BoxRect::new(0.0, 0.0, 20.0, 20.0)).unwrap();
    // 左上角被裁剪
    assert_eq!(crop.dimensions(), (25, 25));
  }
}
