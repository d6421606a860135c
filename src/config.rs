// 该文件是 Jianyan （检验） 项目的一部分。
// src/config.rs - 检测参数与工位配置
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

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::info;

use crate::{detect::field::Binarize, frame::CameraPort, plan::DetectionPlan};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("配置文件 {0} 格式错误: {1}")]
  ParseError(PathBuf, serde_json::Error),
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
  info!("加载配置文件: {}", path.display());
  let data = std::fs::read(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
  serde_json::from_slice(&data).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
}

/// 缺陷扫描参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectScanConfig {
  /// 每个方向的切片数
  pub tile_count: u32,
  /// 相邻切片的重叠比例
  pub overlap_ratio: f32,
  /// 切片前先裁剪到整机区域
  pub crop_to_chassis: bool,
  pub min_area: u64,
  pub iou_threshold: f64,
  /// 每个表面最多保留的缺陷数
  pub top_k: usize,
}

impl Default for DefectScanConfig {
  fn default() -> Self {
    Self {
      tile_count: 2,
      overlap_ratio: 0.2,
      crop_to_chassis: true,
      min_area: 100,
      iou_threshold: 0.5,
      top_k: 5,
    }
  }
}

/// 参与评级的缺陷类别名称，需与缺陷模型的类别表一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectClasses {
  pub scratch: String,
  pub stain: String,
}

impl Default for DefectClasses {
  fn default() -> Self {
    Self {
      scratch: "scratch".to_string(),
      stain: "stain".to_string(),
    }
  }
}

/// 文本字段的定位与二值化参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFieldConfig {
  /// 共享模型中的类别名，None 表示取第一个框
  #[serde(default)]
  pub class_name: Option<String>,
  pub margin_x: u32,
  pub margin_y: u32,
  pub binarize: Binarize,
}

impl TextFieldConfig {
  fn labelled(class_name: &str) -> Self {
    Self {
      class_name: Some(class_name.to_string()),
      margin_x: 2,
      margin_y: 5,
      binarize: Binarize::Fixed {
        level: 150,
        max_value: 200,
      },
    }
  }
}

/// 评级上限：缺陷总数不超过 `a_max` 为 A，不超过 `b_max` 为 B，否则为 C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeLimits {
  pub a_max: u32,
  pub b_max: u32,
}

impl Default for GradeLimits {
  fn default() -> Self {
    Self { a_max: 0, b_max: 3 }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
  pub defect_scan: DefectScanConfig,
  pub classes: DefectClasses,
  pub lot: TextFieldConfig,
  pub asset: TextFieldConfig,
  pub serial: TextFieldConfig,
  pub plan: DetectionPlan,
  pub grade: GradeLimits,
}

impl Default for InspectionConfig {
  fn default() -> Self {
    Self {
      defect_scan: DefectScanConfig::default(),
      classes: DefectClasses::default(),
      lot: TextFieldConfig::labelled("lot"),
      asset: TextFieldConfig::labelled("asset"),
      serial: TextFieldConfig {
        class_name: None,
        margin_x: 10,
        margin_y: 5,
        binarize: Binarize::Otsu { max_value: 220 },
      },
      plan: DetectionPlan::default(),
      grade: GradeLimits::default(),
    }
  }
}

impl InspectionConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    load_json(path)
  }
}

/// 模型来源 URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSources {
  #[serde(default)]
  pub laptop: Option<String>,
  pub logo: String,
  pub lot_asset: String,
  pub serial_region: String,
  pub serial: String,
  pub top_bottom: String,
  pub keyboard: String,
  #[serde(default)]
  pub screen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSource {
  pub port: CameraPort,
  pub url: String,
}

fn default_ocr() -> String {
  "tesseract:///".to_string()
}

fn default_capture_timeout_ms() -> u64 {
  2000
}

/// 工位配置：模型、相机、输出与检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
  pub models: ModelSources,
  #[serde(default = "default_ocr")]
  pub ocr: String,
  pub cameras: Vec<CameraSource>,
  #[serde(default)]
  pub sinks: Vec<String>,
  /// 标注文字使用的字体文件，缺省时只绘制轮廓
  #[serde(default)]
  pub font: Option<PathBuf>,
  #[serde(default = "default_capture_timeout_ms")]
  pub capture_timeout_ms: u64,
  #[serde(default)]
  pub inspection: InspectionConfig,
}

impl StationConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    load_json(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{Role, Surface};

  #[test]
  fn empty_object_yields_defaults() {
    let config: InspectionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, InspectionConfig::default());
    assert_eq!(config.defect_scan.top_k, 5);
    assert_eq!(config.serial.binarize, Binarize::Otsu { max_value: 220 });
  }

  #[test]
  fn partial_override_keeps_other_defaults() {
    let config: InspectionConfig =
      serde_json::from_str(r#"{"defect_scan": {"min_area": 400, "tile_count": 3}}"#).unwrap();
    assert_eq!(config.defect_scan.min_area, 400);
    assert_eq!(config.defect_scan.tile_count, 3);
    assert_eq!(config.defect_scan.overlap_ratio, 0.2);
  }

  #[test]
  fn station_config_parses() {
    let json = r#"{
      "models": {
        "laptop": "replay:///m/laptop.json",
        "logo": "replay:///m/logo.json",
        "lot_asset": "replay:///m/lot.json",
        "serial_region": "replay:///m/region.json",
        "serial": "replay:///m/serial.json",
        "top_bottom": "replay:///m/tb.json",
        "keyboard": "replay:///m/kb.json"
      },
      "cameras": [{"port": 1, "url": "v4l:///dev/video0"}],
      "sinks": ["csv:///data/dataset.csv"],
      "inspection": {
        "plan": [{"port": 3, "roles": [{"defect_scan": "keyboard"}]}]
      }
    }"#;
    let config: StationConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.ocr, "tesseract:///");
    assert_eq!(config.cameras[0].port, CameraPort::TOP);
    assert!(config.models.screen.is_none());
    assert_eq!(
      config.inspection.plan.roles(CameraPort::KEYBOARD),
      &[Role::DefectScan(Surface::Keyboard)]
    );
    assert!(config.inspection.plan.roles(CameraPort::TOP).is_empty());
  }
}
