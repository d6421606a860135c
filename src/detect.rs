// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect.rs - 检测函数
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

use std::fmt;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

use crate::{config::DefectClasses, model::ModelError, ocr::OcrError};

pub mod field;
pub mod geometry;
pub mod postprocess;
pub mod region;
pub mod tiled;

pub use self::field::{extract_label, extract_text_field};
pub use self::geometry::BBox;
pub use self::postprocess::{DefectFilter, filter_defects, iou};
pub use self::region::{Region, locate_region};
pub use self::tiled::{DefectScan, TileOptions, detect_defects};

/// 文本字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
  Lot,
  Asset,
  Serial,
}

impl Field {
  /// 检测失败时写入结果的占位字符串
  pub fn sentinel(&self) -> &'static str {
    match self {
      Field::Lot => "Lot_Not_Found",
      Field::Asset => "Asset_Not_Found",
      Field::Serial => "Serial_Not_Found",
    }
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Field::Lot => write!(f, "批次号"),
      Field::Asset => write!(f, "资产编号"),
      Field::Serial => write!(f, "序列号"),
    }
  }
}

pub const LOGO_SENTINEL: &str = "Logo_Not_Found";

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("未找到目标区域")]
  RegionNotFound,
  #[error("未找到商标")]
  LogoNotFound,
  #[error("未找到{0}")]
  FieldNotFound(Field),
  #[error("模型错误: {0}")]
  ModelError(#[from] ModelError),
  #[error("OCR 错误: {0}")]
  OcrError(#[from] OcrError),
  #[error("检测错误: {0}")]
  DetectionError(String),
}

impl DetectError {
  /// 预期内的“没有检测到”，其余均为意外错误
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      DetectError::RegionNotFound | DetectError::LogoNotFound | DetectError::FieldNotFound(_)
    )
  }
}

/// 检测到的缺陷，坐标位于（可能已裁剪的）表面图像中
#[derive(Debug, Clone)]
pub struct Defect {
  pub class_label: String,
  pub score: f32,
  /// 未经标注的缺陷区域截图
  pub image: RgbImage,
  pub bbox: BBox,
}

impl Defect {
  pub fn area(&self) -> u64 {
    self.bbox.area()
  }
}

/// 单个表面的 `[划痕数, 污渍数]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DefectCounts {
  pub scratch: u32,
  pub stain: u32,
}

impl DefectCounts {
  pub fn from_defects(defects: &[Defect], classes: &DefectClasses) -> Self {
    let mut counts = Self::default();
    for defect in defects {
      counts.record(&defect.class_label, classes);
    }
    counts
  }

  pub fn record(&mut self, class_label: &str, classes: &DefectClasses) {
    if class_label == classes.scratch {
      self.scratch += 1;
    } else if class_label == classes.stain {
      self.stain += 1;
    }
  }

  pub fn as_array(&self) -> [u32; 2] {
    [self.scratch, self.stain]
  }

  pub fn total(&self) -> u32 {
    self.scratch + self.stain
  }
}

impl std::ops::Add for DefectCounts {
  type Output = DefectCounts;

  fn add(self, rhs: Self) -> Self::Output {
    DefectCounts {
      scratch: self.scratch + rhs.scratch,
      stain: self.stain + rhs.stain,
    }
  }
}
