// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect/tiled.rs - 切片缺陷检测
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

use std::{borrow::Cow, time::Instant};

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  config::{DefectClasses, DefectScanConfig},
  detect::{
    BBox, Defect, DefectCounts, DetectError,
    geometry::{bbox_polygon, polygon_area},
    locate_region,
  },
  model::Model,
  output::draw::Draw,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileOptions {
  /// 每个方向的切片数
  pub tile_count: u32,
  pub overlap_ratio: f32,
}

impl Default for TileOptions {
  fn default() -> Self {
    Self {
      tile_count: 2,
      overlap_ratio: 0.2,
    }
  }
}

impl From<&DefectScanConfig> for TileOptions {
  fn from(config: &DefectScanConfig) -> Self {
    Self {
      tile_count: config.tile_count,
      overlap_ratio: config.overlap_ratio,
    }
  }
}

impl TileOptions {
  /// 单个切片的边长，使 `tile_count` 个带重叠的切片恰好覆盖 `length`
  fn slice_length(&self, length: u32) -> u32 {
    let n = self.tile_count.max(1) as f64;
    let ratio = (self.overlap_ratio as f64).clamp(0.0, 0.9);
    let span = n - ratio * (n - 1.0);
    ((length as f64 / span) as u32).clamp(1, length.max(1))
  }
}

/// 按行优先顺序生成切片框，末行末列向内对齐到图像边缘
pub fn slice_boxes(width: u32, height: u32, options: &TileOptions) -> Vec<BBox> {
  if width == 0 || height == 0 {
    return Vec::new();
  }

  let ratio = (options.overlap_ratio as f64).clamp(0.0, 0.9);
  let slice_w = options.slice_length(width);
  let slice_h = options.slice_length(height);
  // 步长至少为 1，保证循环前进
  let overlap_w = ((ratio * slice_w as f64) as u32).min(slice_w - 1);
  let overlap_h = ((ratio * slice_h as f64) as u32).min(slice_h - 1);

  let mut boxes = Vec::new();
  let mut y_min = 0;
  let mut y_max = 0;
  while y_max < height {
    y_max = y_min + slice_h;
    let mut x_min = 0;
    let mut x_max = 0;
    while x_max < width {
      x_max = x_min + slice_w;
      let x2 = x_max.min(width);
      let y2 = y_max.min(height);
      let x1 = x2.saturating_sub(slice_w);
      let y1 = y2.saturating_sub(slice_h);
      if let Some(b) = BBox::new(x1, y1, x2, y2) {
        boxes.push(b);
      }
      x_min = x_max - overlap_w;
    }
    y_min = y_max - overlap_h;
  }
  boxes
}

/// 一个表面的切片扫描结果，坐标位于（可能已裁剪的）表面图像中
#[derive(Debug, Clone)]
pub struct DefectScan {
  pub annotated: RgbImage,
  /// 未经过滤的缺陷
  pub defects: Vec<Defect>,
  pub counts: DefectCounts,
  pub stain_area: f64,
  pub stain_area_percent: f64,
  /// 整机区域在原始帧中的位置，未裁剪时为 None
  pub origin: Option<BBox>,
}

/// 切片运行实例分割模型，拼接各切片结果并在副本上绘制标注
///
/// 给出 `region_model` 时先裁剪到整机区域，找不到区域返回 `RegionNotFound`。
pub fn detect_defects(
  image: &RgbImage,
  model: &dyn Model,
  region_model: Option<&dyn Model>,
  options: &TileOptions,
  classes: &DefectClasses,
  draw: &Draw,
) -> Result<DefectScan, DetectError> {
  let start = Instant::now();

  let (surface, origin) = match region_model {
    Some(region_model) => {
      let region = locate_region(image, region_model)?;
      debug!("整机区域: {:?}", region.bbox);
      (Cow::Owned(region.image), Some(region.bbox))
    }
    None => (Cow::Borrowed(image), None),
  };
  let (width, height) = surface.dimensions();

  let mut annotated: RgbImage = (*surface).clone();
  let mut defects = Vec::new();
  let mut counts = DefectCounts::default();
  let mut stain_area = 0.0;

  let tiles = slice_boxes(width, height, options);
  for tile in &tiles {
    let result = model.infer(&tile.crop(&surface))?;
    let (dx, dy) = (tile.x1 as f32, tile.y1 as f32);

    for item in result.iter() {
      let class_label = model.labels().name(item.class_id).ok_or_else(|| {
        DetectError::DetectionError(format!("类别编号 {} 超出类别表范围", item.class_id))
      })?;

      let bbox = [
        item.bbox[0] + dx,
        item.bbox[1] + dy,
        item.bbox[2] + dx,
        item.bbox[3] + dy,
      ];
      let polygon = match &item.polygon {
        Some(points) if points.len() >= 3 => points.iter().map(|[x, y]| [x + dx, y + dy]).collect(),
        _ => bbox_polygon(bbox),
      };

      counts.record(class_label, classes);
      if class_label == classes.stain {
        stain_area += polygon_area(&polygon);
      }

      draw.draw_defect(
        &mut annotated,
        item.class_id,
        class_label,
        item.score,
        &polygon,
        bbox,
      );

      match BBox::from_xyxy_clamped(bbox, width, height) {
        Some(bbox) => defects.push(Defect {
          class_label: class_label.to_string(),
          score: item.score,
          image: bbox.crop(&surface),
          bbox,
        }),
        None => debug!("丢弃退化的缺陷框 {:?}", bbox),
      }
    }
  }

  let stain_area_percent = if width == 0 || height == 0 {
    0.0
  } else {
    stain_area / (width as f64 * height as f64) * 100.0
  };
  info!(
    "缺陷扫描: {} 个切片, 划痕 {}, 污渍 {}, 污渍面积 {:.2}%, 耗时 {:.2?}",
    tiles.len(),
    counts.scratch,
    counts.stain,
    stain_area_percent,
    start.elapsed()
  );

  Ok(DefectScan {
    annotated,
    defects,
    counts,
    stain_area,
    stain_area_percent,
    origin,
  })
}
