// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect/field.rs - 文本字段与类别字段提取
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

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  config::TextFieldConfig,
  detect::{BBox, DetectError, Field, locate_region},
  model::{DetectResult, Labels, Model},
  ocr::Ocr,
};

/// 二值化方式，像素值大于阈值置为 `max_value`，否则置 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Binarize {
  Fixed { level: u8, max_value: u8 },
  /// 阈值由 Otsu 方法计算
  Otsu { max_value: u8 },
}

impl Binarize {
  pub fn apply(&self, gray: &GrayImage) -> GrayImage {
    let (level, max_value) = match *self {
      Binarize::Fixed { level, max_value } => (level, max_value),
      Binarize::Otsu { max_value } => (imageproc::contrast::otsu_level(gray), max_value),
    };

    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
      pixel.0[0] = if pixel.0[0] > level { max_value } else { 0 };
    }
    out
  }
}

/// 运行字段检测模型，截取字段区域并识别文字
///
/// 返回 OCR 的原始输出，末尾换行由调用者去除。
pub fn extract_text_field(
  image: &RgbImage,
  model: &dyn Model,
  field: Field,
  ocr: &dyn Ocr,
  config: &TextFieldConfig,
) -> Result<String, DetectError> {
  let result = model.infer(image)?;
  text_from_result(image, &result, model.labels(), field, ocr, config)
}

/// 同 [`extract_text_field`]，复用已有的推理结果
pub fn text_from_result(
  image: &RgbImage,
  result: &DetectResult,
  labels: &Labels,
  field: Field,
  ocr: &dyn Ocr,
  config: &TextFieldConfig,
) -> Result<String, DetectError> {
  let item = match &config.class_name {
    Some(name) => result.first_of(labels, name),
    None => result.first(),
  }
  .ok_or(DetectError::FieldNotFound(field))?;

  let (width, height) = image.dimensions();
  let bbox = BBox::from_xyxy_clamped(item.bbox, width, height)
    .ok_or(DetectError::FieldNotFound(field))?
    .expand(config.margin_x, config.margin_y, width, height);
  debug!("{}区域: {:?}", field, bbox);

  let gray = image::imageops::grayscale(&bbox.crop(image));
  let binary = config.binarize.apply(&gray);
  Ok(ocr.recognize(&binary)?)
}

/// 两阶段提取序列号：先定位标签区域，再在标签内定位文字
pub fn extract_serial(
  image: &RgbImage,
  region_model: &dyn Model,
  text_model: &dyn Model,
  ocr: &dyn Ocr,
  config: &TextFieldConfig,
) -> Result<String, DetectError> {
  let region = locate_region(image, region_model).map_err(|e| match e {
    DetectError::RegionNotFound => DetectError::FieldNotFound(Field::Serial),
    e => e,
  })?;
  extract_text_field(&region.image, text_model, Field::Serial, ocr, config)
}

/// 取置信度最高的框的类别名，分数相同时保留先出现的
pub fn extract_label(image: &RgbImage, model: &dyn Model) -> Result<String, DetectError> {
  let result = model.infer(image)?;

  let mut best = None;
  for item in result.iter() {
    match best {
      Some((score, _)) if item.score <= score => {}
      _ => best = Some((item.score, item.class_id)),
    }
  }

  let (score, class_id) = best.ok_or(DetectError::LogoNotFound)?;
  let name = model.labels().name(class_id).ok_or_else(|| {
    DetectError::DetectionError(format!("类别编号 {} 超出类别表范围", class_id))
  })?;
  debug!("商标: {} ({:.2})", name, score);
  Ok(name.to_string())
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use image::{Luma, Rgb};

  use super::*;
  use crate::{
    model::{DetectItem, ReplayModel},
    ocr::OcrError,
  };

  /// 记录收到的图像尺寸并返回固定文本
  struct FixedOcr {
    text: &'static str,
    seen: Mutex<Vec<(u32, u32)>>,
  }

  impl FixedOcr {
    fn new(text: &'static str) -> Self {
      Self {
        text,
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  impl Ocr for FixedOcr {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
      self.seen.lock().unwrap().push(image.dimensions());
      Ok(self.text.to_string())
    }
  }

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
      polygon: None,
    }
  }

  fn lot_config() -> TextFieldConfig {
    crate::config::InspectionConfig::default().lot
  }

  #[test]
  fn fixed_threshold_is_strictly_greater() {
    let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[149u8, 150, 151][x as usize]]));
    let out = Binarize::Fixed {
      level: 150,
      max_value: 200,
    }
    .apply(&gray);
    assert_eq!(out.as_raw(), &vec![0, 0, 200]);
  }

  #[test]
  fn otsu_separates_two_levels() {
    let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 20 } else { 230 }]));
    let out = Binarize::Otsu { max_value: 220 }.apply(&gray);
    assert_eq!(out.get_pixel(0, 0).0[0], 0);
    assert_eq!(out.get_pixel(9, 9).0[0], 220);
  }

  #[test]
  fn binarize_serializes_with_mode_tag() {
    let json = serde_json::to_string(&Binarize::Otsu { max_value: 220 }).unwrap();
    assert_eq!(json, r#"{"mode":"otsu","max_value":220}"#);
  }

  #[test]
  fn text_field_is_cropped_with_margin() {
    let labels: Labels = ["lot", "asset", "barcode"].into_iter().collect();
    let model = ReplayModel::always(labels, vec![item(0, 0.9, [10.0, 10.0, 40.0, 20.0])]);
    let ocr = FixedOcr::new("ABC123\n");
    let image = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));

    let text = extract_text_field(&image, &model, Field::Lot, &ocr, &lot_config()).unwrap();
    assert_eq!(text, "ABC123\n");
    assert_eq!(ocr.seen.lock().unwrap()[0], (34, 20));
  }

  #[test]
  fn missing_class_is_field_not_found() {
    let labels: Labels = ["lot", "asset", "barcode"].into_iter().collect();
    let model = ReplayModel::always(labels, vec![item(2, 0.9, [0.0, 0.0, 10.0, 10.0])]);
    let ocr = FixedOcr::new("x");
    let err = extract_text_field(&RgbImage::new(20, 20), &model, Field::Asset, &ocr, &{
      let mut c = lot_config();
      c.class_name = Some("asset".to_string());
      c
    })
    .unwrap_err();
    assert!(matches!(err, DetectError::FieldNotFound(Field::Asset)));
    assert!(ocr.seen.lock().unwrap().is_empty());
  }

  #[test]
  fn serial_needs_both_stages() {
    let labels: Labels = ["serial"].into_iter().collect();
    let config = crate::config::InspectionConfig::default().serial;
    let image = RgbImage::new(200, 100);
    let ocr = FixedOcr::new("SN-42\n");

    let region = ReplayModel::always(labels.clone(), vec![item(0, 0.8, [50.0, 20.0, 150.0, 80.0])]);
    let text = ReplayModel::always(labels.clone(), vec![item(0, 0.8, [20.0, 10.0, 60.0, 30.0])]);
    let serial = extract_serial(&image, &region, &text, &ocr, &config).unwrap();
    assert_eq!(serial, "SN-42\n");
    // 标签区域 100x60，文字框 40x20 外扩 10/5
    assert_eq!(ocr.seen.lock().unwrap()[0], (60, 30));

    let empty = ReplayModel::always(labels, vec![]);
    let err = extract_serial(&image, &empty, &text, &ocr, &config).unwrap_err();
    assert!(matches!(err, DetectError::FieldNotFound(Field::Serial)));
  }

  #[test]
  fn label_picks_highest_confidence() {
    let labels: Labels = ["dell", "hp", "lenovo"].into_iter().collect();
    let model = ReplayModel::always(
      labels,
      vec![
        item(0, 0.5, [0.0, 0.0, 1.0, 1.0]),
        item(2, 0.9, [0.0, 0.0, 1.0, 1.0]),
        item(1, 0.9, [0.0, 0.0, 1.0, 1.0]),
      ],
    );
    assert_eq!(extract_label(&RgbImage::new(4, 4), &model).unwrap(), "lenovo");
  }

  #[test]
  fn label_without_boxes_is_logo_not_found() {
    let model = ReplayModel::always(["dell"].into_iter().collect(), vec![]);
    assert!(matches!(
      extract_label(&RgbImage::new(4, 4), &model),
      Err(DetectError::LogoNotFound)
    ));
  }
}
