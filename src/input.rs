// 该文件是 Jianyan （检验） 项目的一部分。
// src/input.rs - 相机输入
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 相机帧来源，由所属的预览线程独占读取
pub trait CaptureSource {
  /// 阻塞读取下一帧
  fn read_frame(&mut self) -> Result<RgbImage, InputError>;
}

mod image_file;
pub use self::image_file::ImageFileCamera;

#[cfg(feature = "v4l2_input")]
mod v4l2_camera;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_camera::V4l2Camera;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("设备 I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像读取错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("帧数据错误: {0}")]
  FrameError(String),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum CameraWrapper {
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Camera),
  ImageFile(ImageFileCamera),
}

impl FromUrl for CameraWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "v4l2_input")]
    {
      if url.scheme() == V4l2Camera::SCHEME {
        return Ok(CameraWrapper::V4l2(V4l2Camera::from_url(url)?));
      }
    }

    if url.scheme() == ImageFileCamera::SCHEME {
      return Ok(CameraWrapper::ImageFile(ImageFileCamera::from_url(url)?));
    }

    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl CaptureSource for CameraWrapper {
  fn read_frame(&mut self) -> Result<RgbImage, InputError> {
    match self {
      #[cfg(feature = "v4l2_input")]
      CameraWrapper::V4l2(camera) => camera.read_frame(),
      CameraWrapper::ImageFile(camera) => camera.read_frame(),
    }
  }
}

/// 读取 URL 查询参数并解析为数值
pub(crate) fn query_param<T: std::str::FromStr>(url: &Url, key: &str) -> Result<Option<T>, InputError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v
      .parse()
      .map(Some)
      .map_err(|_| InputError::InvalidParameter(format!("{}={}", key, v))),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_camera_scheme() {
    let url = Url::parse("rtsp://192.168.1.10/stream").unwrap();
    assert!(matches!(
      CameraWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }

  #[test]
  fn query_params_parse() {
    let url = Url::parse("v4l:///dev/video0?width=1280&height=abc").unwrap();
    assert_eq!(query_param::<u32>(&url, "width").unwrap(), Some(1280));
    assert!(query_param::<u32>(&url, "height").is_err());
    assert_eq!(query_param::<u32>(&url, "fps").unwrap(), None);
  }
}
