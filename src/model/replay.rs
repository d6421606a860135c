// 该文件是 Jianyan （检验） 项目的一部分。
// src/model/replay.rs - 回放模型
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

//! 按调用顺序回放预先录制的检测结果。
//!
//! 用于离线复现一次检测流程，以及在没有 NPU 的机器上运行整条流水线。
//! 文件格式：
//!
//! ```json
//! {
//!   "labels": ["scratch", "stain"],
//!   "responses": [[{"class_id": 0, "score": 0.9, "bbox": [1, 2, 30, 40]}], []],
//!   "repeat": false
//! }
//! ```

use std::sync::{Mutex, PoisonError};

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Labels, Model, ModelError},
};

#[derive(Deserialize)]
struct ReplayFile {
  labels: Labels,
  responses: Vec<Vec<DetectItem>>,
  #[serde(default)]
  repeat: bool,
}

pub struct ReplayModel {
  labels: Labels,
  responses: Vec<DetectResult>,
  repeat: bool,
  cursor: Mutex<usize>,
}

impl ReplayModel {
  /// 依次返回 `responses`，耗尽后返回空结果
  pub fn new(labels: Labels, responses: Vec<Vec<DetectItem>>) -> Self {
    Self {
      labels,
      responses: responses.into_iter().map(DetectResult::from).collect(),
      repeat: false,
      cursor: Mutex::new(0),
    }
  }

  /// 每次调用都返回同一组检测结果
  pub fn always(labels: Labels, items: Vec<DetectItem>) -> Self {
    Self::new(labels, vec![items]).repeating()
  }

  /// 耗尽后从头循环
  pub fn repeating(mut self) -> Self {
    self.repeat = true;
    self
  }

  /// 已经发生的推理次数
  pub fn calls(&self) -> usize {
    *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let data = std::fs::read(url.path())?;
    let file: ReplayFile = serde_json::from_slice(&data)?;
    let labels = Labels::from_query(url).unwrap_or(file.labels);
    debug!(
      "回放模型 {}: {} 个类别, {} 组结果",
      url.path(),
      labels.len(),
      file.responses.len()
    );

    let model = Self::new(labels, file.responses);
    Ok(if file.repeat { model.repeating() } else { model })
  }
}

impl Model for ReplayModel {
  fn infer(&self, _input: &RgbImage) -> Result<DetectResult, ModelError> {
    let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
    let index = *cursor;
    *cursor += 1;

    if self.responses.is_empty() {
      return Ok(DetectResult::default());
    }

    let result = if index < self.responses.len() {
      self.responses[index].clone()
    } else if self.repeat {
      self.responses[index % self.responses.len()].clone()
    } else {
      DetectResult::default()
    };
    Ok(result)
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  fn item(class_id: u32) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.8,
      bbox: [0.0, 0.0, 10.0, 10.0],
      polygon: None,
    }
  }

  #[test]
  fn responses_are_consumed_in_order() {
    let model = ReplayModel::new(
      ["a", "b"].into_iter().collect(),
      vec![vec![item(0)], vec![item(1), item(1)]],
    );
    let image = RgbImage::new(4, 4);
    assert_eq!(model.infer(&image).unwrap().len(), 1);
    assert_eq!(model.infer(&image).unwrap().len(), 2);
    assert!(model.infer(&image).unwrap().is_empty());
    assert_eq!(model.calls(), 3);
  }

  #[test]
  fn always_repeats_the_same_result() {
    let model = ReplayModel::always(["a"].into_iter().collect(), vec![item(0)]);
    let image = RgbImage::new(4, 4);
    for _ in 0..5 {
      assert_eq!(model.infer(&image).unwrap().len(), 1);
    }
  }

  #[test]
  fn loads_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"labels": ["scratch", "stain"],
          "responses": [[{{"class_id": 1, "score": 0.5, "bbox": [1, 2, 3, 4],
                           "polygon": [[1, 2], [3, 2], [3, 4]]}}]]}}"#
    )
    .unwrap();
    let url = Url::parse(&format!("replay://{}", file.path().display())).unwrap();
    let model = ReplayModel::from_url(&url).unwrap();
    assert_eq!(model.labels().id_of("stain"), Some(1));
    let result = model.infer(&RgbImage::new(8, 8)).unwrap();
    assert_eq!(result.items[0].polygon.as_ref().unwrap().len(), 3);
  }
}
