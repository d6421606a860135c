// 该文件是 Jianyan （检验） 项目的一部分。
// src/orchestrator.rs - 单次拍摄的检测编排
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

//! 按检测计划依次处理各端口的画面，把每一步的失败转换为占位值。
//!
//! 一次检测总会得到完整的 [`DetectedFeatures`]，调用者不会看到错误。

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
  config::{GradeLimits, InspectionConfig},
  detect::{
    self, Defect, DefectCounts, DefectFilter, DetectError, Field, LOGO_SENTINEL, TileOptions,
    field::{extract_serial, text_from_result},
  },
  frame::{CameraPort, Frame},
  model::{DetectResult, Model, Models},
  ocr::Ocr,
  output::draw::Draw,
  plan::{Role, Surface},
};

/// 单台笔记本的识别结果，任何字段都不会缺失
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedFeatures {
  pub logo: String,
  pub lot: String,
  pub asset: String,
  pub serial: String,
  /// 每个完成缺陷扫描的端口一项，按端口升序
  pub detected_info: Vec<(DefectCounts, CameraPort)>,
}

impl Default for DetectedFeatures {
  fn default() -> Self {
    Self {
      logo: LOGO_SENTINEL.to_string(),
      lot: Field::Lot.sentinel().to_string(),
      asset: Field::Asset.sentinel().to_string(),
      serial: Field::Serial.sentinel().to_string(),
      detected_info: Vec::new(),
    }
  }
}

impl DetectedFeatures {
  pub fn totals(&self) -> DefectCounts {
    self
      .detected_info
      .iter()
      .fold(DefectCounts::default(), |acc, (counts, _)| acc + *counts)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
  A,
  B,
  C,
}

impl Grade {
  pub fn from_counts(counts: DefectCounts, limits: &GradeLimits) -> Self {
    let total = counts.total();
    if total <= limits.a_max {
      Grade::A
    } else if total <= limits.b_max {
      Grade::B
    } else {
      Grade::C
    }
  }
}

impl std::fmt::Display for Grade {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Grade::A => "A",
      Grade::B => "B",
      Grade::C => "C",
    };
    write!(f, "{}", s)
  }
}

/// 一次拍摄检测完成后发布给各订阅者的事件
#[derive(Debug, Clone)]
pub struct CycleReport {
  pub started_at: DateTime<Local>,
  pub elapsed: Duration,
  /// 每个有画面的端口一张，缺陷扫描成功时为标注后的图像
  pub detected_images: Vec<(RgbImage, CameraPort)>,
  pub features: DetectedFeatures,
  /// 过滤后的缺陷
  pub defects_by_port: Vec<(Vec<Defect>, CameraPort)>,
  /// 污渍面积占表面面积的百分比
  pub stain_area: Vec<(f64, CameraPort)>,
  pub grade: Grade,
  /// 本次没有画面的端口
  pub missing_ports: Vec<CameraPort>,
}

impl CycleReport {
  pub fn image(&self, port: CameraPort) -> Option<&RgbImage> {
    self
      .detected_images
      .iter()
      .find(|(_, p)| *p == port)
      .map(|(image, _)| image)
  }

  pub fn defects(&self, port: CameraPort) -> &[Defect] {
    self
      .defects_by_port
      .iter()
      .find(|(_, p)| *p == port)
      .map(|(defects, _)| defects.as_slice())
      .unwrap_or(&[])
  }
}

/// 单个端口的处理结果
struct PortOutcome {
  image: RgbImage,
  scans: Vec<(Vec<Defect>, DefectCounts, f64)>,
}

pub struct Orchestrator {
  models: Models,
  ocr: Arc<dyn Ocr>,
  config: InspectionConfig,
  draw: Draw,
}

impl Orchestrator {
  pub fn new(models: Models, ocr: Arc<dyn Ocr>, config: InspectionConfig) -> Self {
    Self {
      models,
      ocr,
      config,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn config(&self) -> &InspectionConfig {
    &self.config
  }

  /// 处理一次拍摄的全部画面，端口按升序处理，`None` 的端口跳过
  pub fn run_cycle(&self, mut frames: Vec<(CameraPort, Option<Frame>)>) -> CycleReport {
    let started_at = Local::now();
    let start = Instant::now();
    frames.sort_by_key(|(port, _)| *port);

    let mut features = DetectedFeatures::default();
    let mut detected_images = Vec::new();
    let mut defects_by_port = Vec::new();
    let mut stain_area = Vec::new();
    let mut missing_ports = Vec::new();

    for (port, frame) in frames {
      let Some(frame) = frame else {
        warn!("端口 {} ({}) 没有画面，本次跳过", port, port.surface());
        missing_ports.push(port);
        continue;
      };

      let port_start = Instant::now();
      let outcome = self.process_port(port, &frame, &mut features);
      for (defects, counts, percent) in outcome.scans {
        features.detected_info.push((counts, port));
        defects_by_port.push((defects, port));
        stain_area.push((percent, port));
      }
      detected_images.push((outcome.image, port));
      debug!("端口 {} 处理完成, 耗时 {:.2?}", port, port_start.elapsed());
    }

    let grade = Grade::from_counts(features.totals(), &self.config.grade);
    let elapsed = start.elapsed();
    info!(
      "检测完成: 商标 {}, 批次号 {}, 资产编号 {}, 序列号 {}, 评级 {}, 耗时 {:.2?}",
      features.logo, features.lot, features.asset, features.serial, grade, elapsed
    );

    CycleReport {
      started_at,
      elapsed,
      detected_images,
      features,
      defects_by_port,
      stain_area,
      grade,
      missing_ports,
    }
  }

  fn process_port(&self, port: CameraPort, frame: &Frame, features: &mut DetectedFeatures) -> PortOutcome {
    let image = &frame.image;
    let mut outcome = PortOutcome {
      image: image.clone(),
      scans: Vec::new(),
    };
    // lot 与 asset 共用同一次推理
    let mut lot_asset: Option<DetectResult> = None;

    for role in self.config.plan.roles(port) {
      match *role {
        Role::Logo => match detect::extract_label(image, self.models.logo.as_ref()) {
          Ok(logo) => features.logo = logo,
          Err(e) => report_failure(port, role, &e),
        },
        Role::Lot => match self.lot_asset_text(image, &mut lot_asset, Field::Lot) {
          Ok(lot) => features.lot = lot,
          Err(e) => report_failure(port, role, &e),
        },
        Role::Asset => match self.lot_asset_text(image, &mut lot_asset, Field::Asset) {
          Ok(asset) => features.asset = asset,
          Err(e) => report_failure(port, role, &e),
        },
        Role::Serial => {
          let serial = extract_serial(
            image,
            self.models.serial_region.as_ref(),
            self.models.serial.as_ref(),
            self.ocr.as_ref(),
            &self.config.serial,
          );
          match serial {
            Ok(serial) => features.serial = serial.trim_end().to_string(),
            Err(e) => report_failure(port, role, &e),
          }
        }
        Role::DefectScan(surface) => {
          let Some(model) = self.surface_model(surface) else {
            info!("端口 {} 未配置 {:?} 缺陷模型, 跳过缺陷扫描", port, surface);
            continue;
          };
          match self.scan_surface(image, model) {
            Ok((annotated, scan)) => {
              outcome.image = annotated;
              outcome.scans.push(scan);
            }
            Err(e) => report_failure(port, role, &e),
          }
        }
      }
    }

    outcome
  }

  fn lot_asset_text(
    &self,
    image: &RgbImage,
    cache: &mut Option<DetectResult>,
    field: Field,
  ) -> Result<String, DetectError> {
    let model = self.models.lot_asset.as_ref();
    let result = match cache.take() {
      Some(result) => result,
      None => model.infer(image)?,
    };
    let config = match field {
      Field::Asset => &self.config.asset,
      _ => &self.config.lot,
    };
    let text = text_from_result(image, &result, model.labels(), field, self.ocr.as_ref(), config);
    *cache = Some(result);
    Ok(text?.trim_end().to_string())
  }

  fn surface_model(&self, surface: Surface) -> Option<&dyn Model> {
    match surface {
      Surface::TopBottom => Some(self.models.top_bottom.as_ref()),
      Surface::Keyboard => Some(self.models.keyboard.as_ref()),
      Surface::Screen => self.models.screen.as_deref(),
    }
  }

  fn scan_surface(
    &self,
    image: &RgbImage,
    model: &dyn Model,
  ) -> Result<(RgbImage, (Vec<Defect>, DefectCounts, f64)), DetectError> {
    let scan_config = &self.config.defect_scan;
    let region_model = if scan_config.crop_to_chassis {
      self.models.laptop.as_deref()
    } else {
      None
    };

    let scan = detect::detect_defects(
      image,
      model,
      region_model,
      &TileOptions::from(scan_config),
      &self.config.classes,
      &self.draw,
    )?;
    let defects = DefectFilter::from(scan_config).apply(scan.defects);
    let counts = DefectCounts::from_defects(&defects, &self.config.classes);
    Ok((scan.annotated, (defects, counts, scan.stain_area_percent)))
  }
}

fn report_failure(port: CameraPort, role: &Role, err: &DetectError) {
  if err.is_not_found() {
    warn!("端口 {} -> {:?}: {}", port, role, err);
  } else {
    error!("端口 {} -> {:?} 出现意外错误: {}", port, role, err);
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn counts(scratch: u32, stain: u32) -> DefectCounts {
    DefectCounts { scratch, stain }
  }

  #[test]
  fn default_features_are_sentinels() {
    let features = DetectedFeatures::default();
    assert_eq!(features.logo, "Logo_Not_Found");
    assert_eq!(features.lot, "Lot_Not_Found");
    assert_eq!(features.asset, "Asset_Not_Found");
    assert_eq!(features.serial, "Serial_Not_Found");
    assert!(features.detected_info.is_empty());
  }

  #[test]
  fn totals_sum_all_ports() {
    let features = DetectedFeatures {
      detected_info: vec![(counts(1, 2), CameraPort::TOP), (counts(3, 0), CameraPort::KEYBOARD)],
      ..Default::default()
    };
    assert_eq!(features.totals(), counts(4, 2));
  }

  #[test]
  fn grade_follows_limits() {
    let limits = GradeLimits::default();
    assert_eq!(Grade::from_counts(counts(0, 0), &limits), Grade::A);
    assert_eq!(Grade::from_counts(counts(2, 1), &limits), Grade::B);
    assert_eq!(Grade::from_counts(counts(2, 2), &limits), Grade::C);
  }
}
