// 该文件是 Jianyan （检验） 项目的一部分。
// src/ocr/tesseract.rs - Tesseract 文字识别
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

use std::{io::Cursor, time::Instant};

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  ocr::{Ocr, OcrError},
};

const DEFAULT_LANG: &str = "eng";
/// 单行文本
const DEFAULT_PSM: u32 = 7;

/// 通过 leptess 调用 Tesseract
///
/// `LepTess` 不能跨线程共享，每次识别新建一个实例。
#[derive(Debug, Clone)]
pub struct TesseractOcr {
  datapath: Option<String>,
  lang: String,
  psm: u32,
}

impl Default for TesseractOcr {
  fn default() -> Self {
    Self {
      datapath: None,
      lang: DEFAULT_LANG.to_string(),
      psm: DEFAULT_PSM,
    }
  }
}

impl TesseractOcr {
  fn engine(&self) -> Result<LepTess, OcrError> {
    let mut engine = LepTess::new(self.datapath.as_deref(), &self.lang).map_err(|e| {
      OcrError::InitError(format!("语言 '{}': {}", self.lang, e))
    })?;
    engine
      .set_variable(Variable::TesseditPagesegMode, &self.psm.to_string())
      .map_err(|e| OcrError::InitError(format!("psm={}: {}", self.psm, e)))?;
    Ok(engine)
  }
}

impl FromUrlWithScheme for TesseractOcr {
  const SCHEME: &'static str = "tesseract";
}

impl FromUrl for TesseractOcr {
  type Error = OcrError;

  /// `tesseract:///usr/share/tessdata?psm=7&lang=eng`，路径为空时使用默认语言数据目录
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OcrError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut ocr = Self::default();
    if !url.path().is_empty() && url.path() != "/" {
      ocr.datapath = Some(url.path().to_string());
    }

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "psm" => {
          ocr.psm = value
            .parse()
            .map_err(|_| OcrError::InvalidParameter(format!("psm={}", value)))?;
        }
        "lang" => ocr.lang = value.into_owned(),
        _ => debug!("忽略未知参数 {}={}", key, value),
      }
    }

    info!(
      "Tesseract: 语言 {}, psm {}, 数据目录 {:?}",
      ocr.lang, ocr.psm, ocr.datapath
    );
    Ok(ocr)
  }
}

impl Ocr for TesseractOcr {
  fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
    let start = Instant::now();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(OcrError::InvalidParameter(format!(
        "图像尺寸为 {}x{}",
        width, height
      )));
    }

    let mut engine = self.engine()?;
    // leptess 需要编码后的图像数据
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    engine
      .set_image_from_mem(png.get_ref())
      .map_err(|e| OcrError::RecognitionError(format!("载入图像失败: {}", e)))?;

    let text = engine
      .get_utf8_text()
      .map_err(|e| OcrError::RecognitionError(e.to_string()))?;
    debug!("OCR 识别 {:?}, 耗时 {:.2?}", text.trim_end(), start.elapsed());
    Ok(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_url_uses_single_line_mode() {
    let ocr = TesseractOcr::from_url(&Url::parse("tesseract:///").unwrap()).unwrap();
    assert!(ocr.datapath.is_none());
    assert_eq!(ocr.psm, 7);
    assert_eq!(ocr.lang, "eng");
  }

  #[test]
  fn url_parameters_are_applied() {
    let url = Url::parse("tesseract:///usr/share/tessdata?psm=8&lang=chi_sim").unwrap();
    let ocr = TesseractOcr::from_url(&url).unwrap();
    assert_eq!(ocr.datapath.as_deref(), Some("/usr/share/tessdata"));
    assert_eq!(ocr.psm, 8);
    assert_eq!(ocr.lang, "chi_sim");
  }

  #[test]
  fn bad_psm_is_rejected() {
    let url = Url::parse("tesseract:///?psm=line").unwrap();
    assert!(matches!(
      TesseractOcr::from_url(&url),
      Err(OcrError::InvalidParameter(_))
    ));
  }

  #[test]
  fn empty_image_is_rejected() {
    assert!(matches!(
      TesseractOcr::default().recognize(&GrayImage::new(0, 0)),
      Err(OcrError::InvalidParameter(_))
    ));
  }
}
