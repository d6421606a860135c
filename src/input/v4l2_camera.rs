// 该文件是 Jianyan （检验） 项目的一部分。
// src/input/v4l2_camera.rs - V4L2 相机
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

use std::pin::Pin;

use image::RgbImage;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureSource, InputError, query_param},
};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const BUFFER_COUNT: u32 = 4;

/// YUYV 格式的 V4L2 摄像头
///
/// Stream 需要引用 Device，Device 用 Pin<Box> 固定在堆上，Stream 先于 Device 释放。
pub struct V4l2Camera {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  width: u32,
  height: u32,
}

impl V4l2Camera {
  pub fn open(path: &str, width: u32, height: u32) -> Result<Self, InputError> {
    let device = Box::pin(Device::with_path(path)?);

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(InputError::FrameError(format!(
        "{} 不支持 YUYV，实际格式 {}",
        path, format.fourcc
      )));
    }
    info!("打开相机 {}: {}x{}", path, format.width, format.height);

    let mut camera = Self {
      device,
      stream: None,
      width: format.width,
      height: format.height,
    };

    // SAFETY: device 被 Pin<Box> 固定且与 stream 同属一个结构体，
    // Drop 中先取出 stream，引用在其生命周期内始终有效
    let device_ref: &Device = &camera.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, BUFFER_COUNT)?
    };
    camera.stream = Some(stream);
    Ok(camera)
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }
}

impl Drop for V4l2Camera {
  fn drop(&mut self) {
    self.stream.take();
  }
}

impl FromUrlWithScheme for V4l2Camera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4l2Camera {
  type Error = InputError;

  /// `v4l:///dev/video0?width=1280&height=720`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let width = query_param(url, "width")?.unwrap_or(DEFAULT_WIDTH);
    let height = query_param(url, "height")?.unwrap_or(DEFAULT_HEIGHT);
    Self::open(url.path(), width, height)
  }
}

impl CaptureSource for V4l2Camera {
  fn read_frame(&mut self) -> Result<RgbImage, InputError> {
    let stream = self
      .stream
      .as_mut()
      .ok_or_else(|| InputError::FrameError("捕获流已关闭".to_string()))?;
    let (buffer, _meta) = stream.next()?;
    let rgb = yuyv_to_rgb(buffer, self.width, self.height);
    RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
      InputError::FrameError(format!(
        "帧数据长度 {} 与 {}x{} 不符",
        buffer.len(),
        self.width,
        self.height
      ))
    })
  }
}

/// YUYV 转 RGB，每 4 字节对应两个像素
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn neutral_chroma_is_gray() {
    let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1);
    assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
  }

  #[test]
  fn trailing_partial_chunk_is_ignored() {
    assert_eq!(yuyv_to_rgb(&[50, 128, 60, 128, 70], 2, 1).len(), 6);
  }
}
