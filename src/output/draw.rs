// 该文件是 Jianyan （检验） 项目的一部分。
// src/output/draw.rs - 缺陷标注绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use tracing::info;

use crate::output::OutputError;

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_HEIGHT: i32 = 22;
const LABEL_CHAR_WIDTH: f32 = 10.0; // 每字符平均宽度（粗略估计）
const PALETTE_SIZE: usize = 16;

/// 在表面图像上绘制缺陷轮廓与标签，未配置字体时只画轮廓
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn from_font_file(path: &Path) -> Result<Self, OutputError> {
    info!("加载标注字体: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| OutputError::FontError(format!("{}: {}", path.display(), e)))?;
    Ok(Self::default().with_font(font))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 绘制闭合多边形
  pub fn draw_polygon(&self, image: &mut RgbImage, polygon: &[[f32; 2]], color: Rgb<u8>) {
    if polygon.len() < 2 {
      return;
    }
    for (i, start) in polygon.iter().enumerate() {
      let end = polygon[(i + 1) % polygon.len()];
      draw_line_segment_mut(image, (start[0], start[1]), (end[0], end[1]), color);
    }
  }

  /// 在 `(x, y)` 上方绘制带底色的标签
  pub fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, label: &str, color: Rgb<u8>) {
    let Some(font) = &self.font else {
      return;
    };

    let text_width = (label.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x.clamp(0, image.width() as i32 - 1);
    let label_y = (y - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(image.width() as i32 - label_x).max(0) as u32;

    if label_width > 0 {
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + 2,
        self.font_scale,
        font,
        label,
      );
    }
  }

  /// 绘制一个缺陷：轮廓加 `类别: 置信度%` 标签
  pub fn draw_defect(
    &self,
    image: &mut RgbImage,
    class_id: u32,
    class_label: &str,
    score: f32,
    polygon: &[[f32; 2]],
    bbox: [f32; 4],
  ) {
    let color = self.color(class_id);
    self.draw_polygon(image, polygon, color);
    let label = format!("{}: {:.2}%", class_label, score * 100.0);
    self.draw_label(image, bbox[0] as i32, bbox[1] as i32, &label, color);
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn palette_is_distinct_and_wraps() {
    let draw = Draw::default();
    assert_ne!(draw.color(0), draw.color(1));
    assert_eq!(draw.color(0), draw.color(PALETTE_SIZE as u32));
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
  }

  #[test]
  fn polygon_outline_touches_vertices() {
    let draw = Draw::default();
    let mut image = RgbImage::new(20, 20);
    let color = draw.color(3);
    draw.draw_polygon(
      &mut image,
      &[[2.0, 2.0], [15.0, 2.0], [15.0, 12.0], [2.0, 12.0]],
      color,
    );
    assert_eq!(*image.get_pixel(2, 2), color);
    assert_eq!(*image.get_pixel(8, 12), color);
    assert_eq!(*image.get_pixel(8, 7), Rgb([0, 0, 0]));
  }

  #[test]
  fn label_is_skipped_without_font() {
    let draw = Draw::default();
    assert!(!draw.has_font());
    let mut image = RgbImage::new(40, 40);
    draw.draw_label(&mut image, 5, 30, "scratch: 90.00%", Rgb([255, 0, 0]));
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(Draw::from_font_file(Path::new("/nonexistent/font.ttf")).is_err());
  }
}
