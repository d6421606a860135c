// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect/geometry.rs - 边界框与多边形
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

use geo::{Area, Coord, LineString, Polygon};
use image::RgbImage;
use serde::Serialize;

/// 像素坐标的轴对齐边界框，保证 `x1 < x2`、`y1 < y2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl BBox {
  pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
    if x1 < x2 && y1 < y2 {
      Some(Self { x1, y1, x2, y2 })
    } else {
      None
    }
  }

  /// 将模型输出的浮点框截断为整数并裁剪到 `width x height` 内，退化的框返回 None
  pub fn from_xyxy_clamped(bbox: [f32; 4], width: u32, height: u32) -> Option<Self> {
    let clamp = |v: f32, max: u32| -> u32 {
      if v.is_nan() || v <= 0.0 {
        0
      } else {
        (v.trunc() as u64).min(max as u64) as u32
      }
    };
    Self::new(
      clamp(bbox[0], width),
      clamp(bbox[1], height),
      clamp(bbox[2], width),
      clamp(bbox[3], height),
    )
  }

  pub fn width(&self) -> u32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> u32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn intersection_area(&self, other: &BBox) -> u64 {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);
    if x1 >= x2 || y1 >= y2 {
      return 0;
    }
    (x2 - x1) as u64 * (y2 - y1) as u64
  }

  /// 向四周扩展边距，并裁剪到图像范围内；要求该框本身位于图像内
  pub fn expand(&self, margin_x: u32, margin_y: u32, width: u32, height: u32) -> BBox {
    BBox {
      x1: self.x1.saturating_sub(margin_x),
      y1: self.y1.saturating_sub(margin_y),
      x2: self.x2.saturating_add(margin_x).min(width),
      y2: self.y2.saturating_add(margin_y).min(height),
    }
  }

  /// 从图像中复制出该区域
  pub fn crop(&self, image: &RgbImage) -> RgbImage {
    image::imageops::crop_imm(image, self.x1, self.y1, self.width(), self.height()).to_image()
  }
}

/// 多边形面积，少于三个点时为 0
pub fn polygon_area(points: &[[f32; 2]]) -> f64 {
  if points.len() < 3 {
    return 0.0;
  }
  let ring: Vec<Coord<f64>> = points
    .iter()
    .map(|[x, y]| Coord {
      x: f64::from(*x),
      y: f64::from(*y),
    })
    .collect();
  Polygon::new(LineString::from(ring), vec![]).unsigned_area()
}

/// 边界框的四个角点，用于没有分割轮廓的检测结果
pub fn bbox_polygon(bbox: [f32; 4]) -> Vec<[f32; 2]> {
  vec![
    [bbox[0], bbox[1]],
    [bbox[2], bbox[1]],
    [bbox[2], bbox[3]],
    [bbox[0], bbox[3]],
  ]
}
