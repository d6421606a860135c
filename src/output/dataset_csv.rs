// 该文件是 Jianyan （检验） 项目的一部分。
// src/output/dataset_csv.rs - 数据集 CSV 记录
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

use std::{fs::OpenOptions, path::PathBuf};

use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  orchestrator::CycleReport,
  output::{CycleSink, OutputError},
};

#[derive(Serialize)]
struct DatasetRow<'a> {
  model: &'a str,
  #[serde(rename = "serial number")]
  serial: &'a str,
  #[serde(rename = "lot number")]
  lot: &'a str,
  grade: String,
  stain: u32,
  scratch: u32,
}

/// 每次检测向 CSV 追加一行，文件为空时先写表头
pub struct DatasetCsvSink {
  path: PathBuf,
}

impl DatasetCsvSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl FromUrlWithScheme for DatasetCsvSink {
  const SCHEME: &'static str = "csv";
}

impl FromUrl for DatasetCsvSink {
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

impl CycleSink for DatasetCsvSink {
  fn on_cycle(&self, report: &CycleReport) -> Result<(), OutputError> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    let empty = file.metadata()?.len() == 0;

    let features = &report.features;
    let totals = features.totals();
    let row = DatasetRow {
      model: &features.logo,
      serial: &features.serial,
      lot: &features.lot,
      grade: report.grade.to_string(),
      stain: totals.stain,
      scratch: totals.scratch,
    };

    let mut writer = csv::WriterBuilder::new()
      .has_headers(empty)
      .from_writer(file);
    writer.serialize(&row)?;
    writer.flush()?;

    debug!("数据集追加一行: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::orchestrator::tests_support::{empty_report, sample_report};

  #[test]
  fn header_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("dataset.csv");
    let sink = DatasetCsvSink::new(&path);

    sink.on_cycle(&sample_report()).unwrap();
    sink.on_cycle(&empty_report()).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "model,serial number,lot number,grade,stain,scratch");
    assert_eq!(lines[1], "dell,SN123,LOT/42,B,1,1");
    assert_eq!(lines[2], "Logo_Not_Found,Serial_Not_Found,Lot_Not_Found,A,0,0");
  }
}
