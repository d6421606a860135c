// 该文件是 Jianyan （检验） 项目的一部分。
// src/output.rs - 检测结果与预览输出
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

use std::{
  collections::BTreeMap,
  sync::{Mutex, PoisonError, mpsc::Sender},
};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{CameraPort, Frame},
  orchestrator::CycleReport,
};

/// 检测完成事件的订阅者
pub trait CycleSink: Send {
  fn on_cycle(&self, report: &CycleReport) -> Result<(), OutputError>;
}

/// 实时预览画面的接收者，由各相机线程并发调用
pub trait PreviewSink: Send + Sync {
  fn on_frame(&self, frame: &Frame);
}

pub mod draw;

mod dataset_csv;
pub use self::dataset_csv::DatasetCsvSink;

mod directory_record;
pub use self::directory_record::DirectoryRecordSink;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("CSV 错误: {0}")]
  CsvError(#[from] csv::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("字体错误: {0}")]
  FontError(String),
  #[error("接收端已关闭")]
  ChannelClosed,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum SinkWrapper {
  DirectoryRecord(DirectoryRecordSink),
  DatasetCsv(DatasetCsvSink),
}

impl FromUrl for SinkWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryRecordSink::SCHEME => Ok(SinkWrapper::DirectoryRecord(
        DirectoryRecordSink::from_url(url)?,
      )),
      DatasetCsvSink::SCHEME => Ok(SinkWrapper::DatasetCsv(DatasetCsvSink::from_url(url)?)),
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl CycleSink for SinkWrapper {
  fn on_cycle(&self, report: &CycleReport) -> Result<(), OutputError> {
    match self {
      SinkWrapper::DirectoryRecord(sink) => sink.on_cycle(report),
      SinkWrapper::DatasetCsv(sink) => sink.on_cycle(report),
    }
  }
}

/// 把检测结果转发到通道，供界面等其他线程消费
pub struct ChannelSink {
  sender: Sender<CycleReport>,
}

impl ChannelSink {
  pub fn new(sender: Sender<CycleReport>) -> Self {
    Self { sender }
  }
}

impl CycleSink for ChannelSink {
  fn on_cycle(&self, report: &CycleReport) -> Result<(), OutputError> {
    self
      .sender
      .send(report.clone())
      .map_err(|_| OutputError::ChannelClosed)
  }
}

/// 统计每个端口收到的预览帧数
#[derive(Default)]
pub struct FrameCounter {
  counts: Mutex<BTreeMap<CameraPort, u64>>,
  log_every: u64,
}

impl FrameCounter {
  /// 每收到 `log_every` 帧输出一条日志，0 表示不输出
  pub fn new(log_every: u64) -> Self {
    Self {
      counts: Mutex::new(BTreeMap::new()),
      log_every,
    }
  }

  pub fn count(&self, port: CameraPort) -> u64 {
    let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
    counts.get(&port).copied().unwrap_or(0)
  }
}

impl PreviewSink for FrameCounter {
  fn on_frame(&self, frame: &Frame) {
    let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
    let count = counts.entry(frame.port).or_insert(0);
    *count += 1;
    if self.log_every > 0 && *count % self.log_every == 0 {
      debug!(
        "端口 {} 预览 {} 帧, {}x{}",
        frame.port,
        count,
        frame.width(),
        frame.height()
      );
    }
  }
}
