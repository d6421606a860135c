// 该文件是 Jianyan （检验） 项目的一部分。
// src/ocr.rs - 文字识别
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

use image::GrayImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// OCR 引擎，输入为二值化后的灰度图
pub trait Ocr: Send + Sync {
  fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;
}

#[derive(Error, Debug)]
pub enum OcrError {
  #[error("OCR 引擎初始化失败: {0}")]
  InitError(String),
  #[error("OCR 识别失败: {0}")]
  RecognitionError(String),
  #[error("OCR 图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("OCR 回放文件错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("OCR 回放文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("OCR 参数错误: {0}")]
  InvalidParameter(String),
}

mod replay;
pub use self::replay::ReplayOcr;

#[cfg(feature = "ocr_tesseract")]
mod tesseract;
#[cfg(feature = "ocr_tesseract")]
pub use self::tesseract::TesseractOcr;

pub enum OcrWrapper {
  Replay(ReplayOcr),
  #[cfg(feature = "ocr_tesseract")]
  Tesseract(TesseractOcr),
}

impl FromUrl for OcrWrapper {
  type Error = OcrError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "ocr_tesseract")]
    {
      if url.scheme() == TesseractOcr::SCHEME {
        return Ok(OcrWrapper::Tesseract(TesseractOcr::from_url(url)?));
      }
    }

    if url.scheme() == ReplayOcr::SCHEME {
      return Ok(OcrWrapper::Replay(ReplayOcr::from_url(url)?));
    }

    Err(OcrError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Ocr for OcrWrapper {
  fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
    match self {
      OcrWrapper::Replay(ocr) => ocr.recognize(image),
      #[cfg(feature = "ocr_tesseract")]
      OcrWrapper::Tesseract(ocr) => ocr.recognize(image),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_ocr_scheme() {
    let url = Url::parse("paddle:///models/rec.onnx").unwrap();
    assert!(matches!(
      OcrWrapper::from_url(&url),
      Err(OcrError::SchemeMismatch(s)) if s == "paddle"
    ));
  }

  #[cfg(not(feature = "ocr_tesseract"))]
  #[test]
  fn tesseract_needs_feature() {
    let url = Url::parse("tesseract:///?psm=7").unwrap();
    assert!(matches!(
      OcrWrapper::from_url(&url),
      Err(OcrError::SchemeMismatch(_))
    ));
  }
}
