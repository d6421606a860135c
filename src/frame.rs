// 该文件是 Jianyan （检验） 项目的一部分。
// src/frame.rs - 相机帧与相机端口定义
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
use serde::{Deserialize, Serialize};

/// 相机端口，每个端口固定对应笔记本的一个表面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraPort(pub u8);

impl CameraPort {
  pub const TOP: CameraPort = CameraPort(1);
  pub const BOTTOM: CameraPort = CameraPort(2);
  pub const KEYBOARD: CameraPort = CameraPort(3);
  pub const SCREEN: CameraPort = CameraPort(4);
  pub const LEFT: CameraPort = CameraPort(5);
  pub const RIGHT: CameraPort = CameraPort(6);

  /// 端口对应的表面名称，用于文件命名与报告
  pub fn surface(&self) -> String {
    match self.0 {
      1 => "top".to_string(),
      2 => "bottom".to_string(),
      3 => "keyboard".to_string(),
      4 => "screen".to_string(),
      5 => "left".to_string(),
      6 => "right".to_string(),
      n => format!("port{}", n),
    }
  }
}

impl fmt::Display for CameraPort {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 来源端口
  pub port: CameraPort,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, port: CameraPort) -> Self {
    Self {
      image,
      port,
      index: 0,
      timestamp_ms: 0,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}
