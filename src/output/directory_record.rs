// 该文件是 Jianyan （检验） 项目的一部分。
// src/output/directory_record.rs - 按日期目录保存检测记录
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

use chrono::Datelike;
use serde::Serialize;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::{BBox, Field},
  frame::CameraPort,
  orchestrator::{CycleReport, DetectedFeatures, Grade},
  output::{CycleSink, OutputError},
};

#[derive(Serialize)]
struct DefectRecord<'a> {
  port: CameraPort,
  surface: String,
  class: &'a str,
  score: f32,
  bbox: BBox,
  file: String,
}

#[derive(Serialize)]
struct StainRecord {
  port: CameraPort,
  percent: f64,
}

#[derive(Serialize)]
struct ReportRecord<'a> {
  started_at: String,
  elapsed_ms: u128,
  features: &'a DetectedFeatures,
  grade: Grade,
  stain_area: Vec<StainRecord>,
  defects: Vec<DefectRecord<'a>>,
  missing_ports: &'a [CameraPort],
}

/// 在 `root/YYYY/MM/DD/{lot}/` 下保存表面图像、缺陷截图和 `report.json`
pub struct DirectoryRecordSink {
  directory: PathBuf,
}

impl DirectoryRecordSink {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  /// 本次记录所在的目录
  pub fn record_dir(&self, report: &CycleReport) -> PathBuf {
    let date = report.started_at;
    self
      .directory
      .join(date.year().to_string())
      .join(format!("{:02}", date.month()))
      .join(format!("{:02}", date.day()))
      .join(record_name(report))
  }
}

/// 记录名取批次号，没有可用批次号时用占位值加拍摄时刻，避免不同机器互相覆盖
fn record_name(report: &CycleReport) -> String {
  let lot = &report.features.lot;
  let stem = file_stem(lot);
  if stem.is_empty() || lot == Field::Lot.sentinel() {
    format!(
      "{}_{}",
      Field::Lot.sentinel(),
      report.started_at.format("%H%M%S%3f")
    )
  } else {
    stem
  }
}

/// 批次号用作文件名时替换路径分隔符等字符
fn file_stem(name: &str) -> String {
  name
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect()
}

impl FromUrlWithScheme for DirectoryRecordSink {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordSink {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url.path()))
  }
}

impl CycleSink for DirectoryRecordSink {
  fn on_cycle(&self, report: &CycleReport) -> Result<(), OutputError> {
    let directory = self.record_dir(report);
    std::fs::create_dir_all(&directory)?;
    let lot = record_name(report);

    for (image, port) in &report.detected_images {
      image.save(directory.join(format!("{}_{}.jpg", lot, port.surface())))?;
    }

    let mut defects = Vec::new();
    for (list, port) in &report.defects_by_port {
      for (n, defect) in list.iter().enumerate() {
        let file = format!(
          "{}_{}_defect{}_{}.png",
          lot,
          port.surface(),
          n,
          file_stem(&defect.class_label)
        );
        defect.image.save(directory.join(&file))?;
        defects.push(DefectRecord {
          port: *port,
          surface: port.surface(),
          class: &defect.class_label,
          score: defect.score,
          bbox: defect.bbox,
          file,
        });
      }
    }

    let record = ReportRecord {
      started_at: report.started_at.to_rfc3339(),
      elapsed_ms: report.elapsed.as_millis(),
      features: &report.features,
      grade: report.grade,
      stain_area: report
        .stain_area
        .iter()
        .map(|&(percent, port)| StainRecord { port, percent })
        .collect(),
      defects,
      missing_ports: &report.missing_ports,
    };
    write_json(&directory.join("report.json"), &record)?;

    info!("检测记录已保存到 {}", directory.display());
    Ok(())
  }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
  let file = std::fs::File::create(path)?;
  serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
  Ok(())
}
