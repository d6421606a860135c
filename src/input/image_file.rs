// 该文件是 Jianyan （检验） 项目的一部分。
// src/input/image_file.rs - 静态图像相机
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

use std::time::Duration;

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureSource, InputError, query_param},
};

const DEFAULT_INTERVAL_MS: u64 = 33;

/// 以固定间隔重复输出同一张图像，用于离线工位与测试
pub struct ImageFileCamera {
  image: RgbImage,
  interval: Duration,
}

impl ImageFileCamera {
  pub fn new(image: RgbImage, interval: Duration) -> Self {
    Self { image, interval }
  }
}

impl FromUrlWithScheme for ImageFileCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileCamera {
  type Error = InputError;

  /// `image:///path/top.jpg?interval_ms=33`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let interval_ms = query_param(url, "interval_ms")?.unwrap_or(DEFAULT_INTERVAL_MS);
    let image = ImageReader::open(url.path())?.decode()?.to_rgb8();
    info!(
      "图像相机 {}: {}x{}, 间隔 {} ms",
      url.path(),
      image.width(),
      image.height(),
      interval_ms
    );

    Ok(Self::new(image, Duration::from_millis(interval_ms)))
  }
}

impl CaptureSource for ImageFileCamera {
  fn read_frame(&mut self) -> Result<RgbImage, InputError> {
    std::thread::sleep(self.interval);
    Ok(self.image.clone())
  }
}
