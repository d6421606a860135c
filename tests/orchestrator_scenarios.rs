// 该文件是 Jianyan （检验） 项目的一部分。
// tests/orchestrator_scenarios.rs - 检测编排场景测试
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

use std::sync::Arc;

use image::{GrayImage, RgbImage};

use jianyan::{
  config::InspectionConfig,
  frame::{CameraPort, Frame},
  model::{DetectItem, Labels, Models, ReplayModel},
  ocr::{Ocr, OcrError},
  orchestrator::{Grade, Orchestrator},
  plan::{DetectionPlan, Role, Surface},
};

struct FixedOcr(&'static str);

impl Ocr for FixedOcr {
  fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
    Ok(self.0.to_string())
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

fn labels(names: &[&str]) -> Labels {
  names.iter().copied().collect()
}

fn defect_labels() -> Labels {
  labels(&["scratch", "stain"])
}

/// 每个模型都对任何输入给出 (0,0,50,50)，缺陷模型给出面积 2000 与 50 的两处划痕
fn models() -> Models {
  let region = |names: &[&str]| -> Arc<ReplayModel> {
    Arc::new(ReplayModel::always(
      labels(names),
      vec![item(0, 0.9, [0.0, 0.0, 50.0, 50.0])],
    ))
  };
  let defects = || {
    Arc::new(ReplayModel::always(
      defect_labels(),
      vec![
        item(0, 0.8, [100.0, 100.0, 150.0, 140.0]),
        item(0, 0.6, [10.0, 10.0, 20.0, 15.0]),
      ],
    ))
  };

  Models {
    laptop: None,
    logo: region(&["dell", "hp"]),
    lot_asset: Arc::new(ReplayModel::always(
      labels(&["lot", "asset", "barcode"]),
      vec![
        item(0, 0.9, [0.0, 0.0, 50.0, 50.0]),
        item(1, 0.9, [60.0, 0.0, 110.0, 50.0]),
      ],
    )),
    serial_region: region(&["label"]),
    serial: region(&["serial"]),
    top_bottom: defects(),
    keyboard: defects(),
    screen: Some(defects()),
  }
}

fn config() -> InspectionConfig {
  let mut config = InspectionConfig::default();
  config.defect_scan.tile_count = 1;
  config.defect_scan.min_area = 100;
  config
}

fn frame(port: CameraPort) -> (CameraPort, Option<Frame>) {
  (port, Some(Frame::new(RgbImage::new(200, 200), port)))
}

fn orchestrator(models: Models, config: InspectionConfig) -> Orchestrator {
  Orchestrator::new(models, Arc::new(FixedOcr("ABC123\n")), config)
}

#[test]
fn all_frames_missing_still_yields_complete_record() {
  let orchestrator = orchestrator(models(), config());
  let frames = [1, 2, 3, 4]
    .into_iter()
    .map(|p| (CameraPort(p), None))
    .collect();
  let report = orchestrator.run_cycle(frames);

  let features = &report.features;
  assert_eq!(features.logo, "Logo_Not_Found");
  assert_eq!(features.lot, "Lot_Not_Found");
  assert_eq!(features.asset, "Asset_Not_Found");
  assert_eq!(features.serial, "Serial_Not_Found");
  assert!(features.detected_info.is_empty());
  assert!(report.detected_images.is_empty());
  assert_eq!(report.missing_ports.len(), 4);
  assert_eq!(report.grade, Grade::A);
}

#[test]
fn happy_path_drops_small_defect() {
  let config = InspectionConfig {
    plan: DetectionPlan::empty().with(
      CameraPort::TOP,
      [Role::Lot, Role::DefectScan(Surface::TopBottom)],
    ),
    ..config()
  };
  let report = orchestrator(models(), config).run_cycle(vec![frame(CameraPort::TOP)]);

  assert_eq!(report.features.lot, "ABC123");
  assert_eq!(report.features.detected_info.len(), 1);
  let (counts, port) = report.features.detected_info[0];
  assert_eq!(port, CameraPort::TOP);
  assert_eq!(counts.scratch, 1);
  assert_eq!(counts.stain, 0);

  let defects = report.defects(CameraPort::TOP);
  assert_eq!(defects.len(), 1);
  assert_eq!(defects[0].area(), 2000);
  assert_eq!(defects[0].image.dimensions(), (50, 40));
  assert_eq!(report.grade, Grade::B);
}

#[test]
fn missing_camera_has_no_detected_info() {
  let orchestrator = orchestrator(models(), config());
  let report = orchestrator.run_cycle(vec![
    frame(CameraPort::SCREEN),
    frame(CameraPort::TOP),
    (CameraPort::KEYBOARD, None),
    frame(CameraPort::BOTTOM),
  ]);

  let ports: Vec<_> = report
    .features
    .detected_info
    .iter()
    .map(|(_, port)| *port)
    .collect();
  assert_eq!(ports, vec![CameraPort::TOP, CameraPort::BOTTOM, CameraPort::SCREEN]);
  assert_eq!(report.missing_ports, vec![CameraPort::KEYBOARD]);
  assert!(report.image(CameraPort::KEYBOARD).is_none());

  let features = &report.features;
  assert_eq!(features.logo, "dell");
  assert_eq!(features.lot, "ABC123");
  assert_eq!(features.asset, "ABC123");
  assert_eq!(features.serial, "ABC123");
}

#[test]
fn lot_and_asset_share_one_inference() {
  let lot_asset = Arc::new(ReplayModel::always(
    labels(&["lot", "asset", "barcode"]),
    vec![item(0, 0.9, [0.0, 0.0, 50.0, 50.0])],
  ));
  let models = Models {
    lot_asset: lot_asset.clone(),
    ..models()
  };
  let report = orchestrator(models, config()).run_cycle(vec![frame(CameraPort::TOP)]);

  assert_eq!(lot_asset.calls(), 1);
  assert_eq!(report.features.lot, "ABC123");
  // 没有 asset 框时只有资产编号为占位值
  assert_eq!(report.features.asset, "Asset_Not_Found");
}

#[test]
fn failures_are_isolated_per_role() {
  let models = Models {
    logo: Arc::new(ReplayModel::always(labels(&["dell"]), vec![])),
    serial_region: Arc::new(ReplayModel::always(labels(&["label"]), vec![])),
    // 类别编号超出类别表，属于意外错误
    keyboard: Arc::new(ReplayModel::always(
      defect_labels(),
      vec![item(7, 0.9, [0.0, 0.0, 30.0, 30.0])],
    )),
    ..models()
  };
  let report = orchestrator(models, config()).run_cycle(vec![
    frame(CameraPort::TOP),
    frame(CameraPort::BOTTOM),
    frame(CameraPort::KEYBOARD),
  ]);

  let features = &report.features;
  assert_eq!(features.logo, "Logo_Not_Found");
  assert_eq!(features.serial, "Serial_Not_Found");
  assert_eq!(features.lot, "ABC123");
  let ports: Vec<_> = features.detected_info.iter().map(|(_, p)| *p).collect();
  assert_eq!(ports, vec![CameraPort::TOP, CameraPort::BOTTOM]);
  // 扫描失败的端口仍保留原始画面
  assert!(report.image(CameraPort::KEYBOARD).is_some());
}

#[test]
fn chassis_region_not_found_skips_scan() {
  let models = Models {
    laptop: Some(Arc::new(ReplayModel::always(labels(&["laptop"]), vec![]))),
    ..models()
  };
  let config = InspectionConfig {
    plan: DetectionPlan::empty().with(CameraPort::KEYBOARD, [Role::DefectScan(Surface::Keyboard)]),
    ..config()
  };
  let report = orchestrator(models, config).run_cycle(vec![frame(CameraPort::KEYBOARD)]);
  assert!(report.features.detected_info.is_empty());
  assert_eq!(report.detected_images.len(), 1);
}

#[test]
fn screen_without_model_is_skipped() {
  let models = Models {
    screen: None,
    ..models()
  };
  let report = orchestrator(models, config()).run_cycle(vec![frame(CameraPort::SCREEN)]);
  assert!(report.features.detected_info.is_empty());
  assert_eq!(report.detected_images.len(), 1);
}

#[test]
fn only_trailing_whitespace_is_stripped() {
  let orchestrator = Orchestrator::new(models(), Arc::new(FixedOcr(" 0042 LOT\r\n")), config());
  let report = orchestrator.run_cycle(vec![frame(CameraPort::TOP), frame(CameraPort::BOTTOM)]);
  assert_eq!(report.features.lot, " 0042 LOT");
  assert_eq!(report.features.asset, " 0042 LOT");
  assert_eq!(report.features.serial, " 0042 LOT");
}
