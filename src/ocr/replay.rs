// 该文件是 Jianyan （检验） 项目的一部分。
// src/ocr/replay.rs - 回放文字识别结果
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

//! 按调用顺序回放预先录制的识别文本，与回放模型配合离线运行整条流水线。
//!
//! 文件格式：`{"texts": ["ABC123\n", "SN42\n"], "repeat": true}`

use std::sync::{Mutex, PoisonError};

use image::GrayImage;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  ocr::{Ocr, OcrError},
};

#[derive(Deserialize)]
struct ReplayFile {
  texts: Vec<String>,
  #[serde(default)]
  repeat: bool,
}

pub struct ReplayOcr {
  texts: Vec<String>,
  repeat: bool,
  cursor: Mutex<usize>,
}

impl ReplayOcr {
  /// 依次返回 `texts`，耗尽后返回空字符串
  pub fn new(texts: Vec<String>) -> Self {
    Self {
      texts,
      repeat: false,
      cursor: Mutex::new(0),
    }
  }

  /// 每次都返回同一段文本
  pub fn always(text: impl Into<String>) -> Self {
    Self::new(vec![text.into()]).repeating()
  }

  pub fn repeating(mut self) -> Self {
    self.repeat = true;
    self
  }

  pub fn calls(&self) -> usize {
    *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl FromUrlWithScheme for ReplayOcr {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayOcr {
  type Error = OcrError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OcrError::SchemeMismatch(url.scheme().to_string()));
    }

    let data = std::fs::read(url.path())?;
    let file: ReplayFile = serde_json::from_slice(&data)?;
    debug!("回放 OCR {}: {} 段文本", url.path(), file.texts.len());

    let ocr = Self::new(file.texts);
    Ok(if file.repeat { ocr.repeating() } else { ocr })
  }
}

impl Ocr for ReplayOcr {
  fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
    let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
    let index = *cursor;
    *cursor += 1;

    let text = match self.texts.len() {
      0 => None,
      n if index < n => self.texts.get(index),
      n if self.repeat => self.texts.get(index % n),
      _ => None,
    };
    Ok(text.cloned().unwrap_or_default())
  }
}
