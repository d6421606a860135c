// 该文件是 Jianyan （检验） 项目的一部分。
// src/model.rs - 模型
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

use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, config::ModelSources};

/// 检测模型，推理结果的坐标均为输入图像的像素坐标
pub trait Model: Send + Sync {
  fn infer(&self, input: &RgbImage) -> Result<DetectResult, ModelError>;
  fn labels(&self) -> &Labels;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  /// 实例分割模型给出的轮廓，检测模型为 None
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub polygon: Option<Vec<[f32; 2]>>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }

  /// 按模型输出顺序的第一个框
  pub fn first(&self) -> Option<&DetectItem> {
    self.items.first()
  }

  /// 指定类别的第一个框
  pub fn first_of(&self, labels: &Labels, name: &str) -> Option<&DetectItem> {
    let id = labels.id_of(name)?;
    self.items.iter().find(|item| item.class_id == id)
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 类别编号到名称的映射，由模型自身提供
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  pub fn id_of(&self, name: &str) -> Option<u32> {
    self.names.iter().position(|n| n == name).map(|i| i as u32)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 从 URL 查询参数 `labels=a,b,c` 中解析
  pub fn from_query(url: &Url) -> Option<Self> {
    url
      .query_pairs()
      .find(|(k, _)| k == "labels")
      .map(|(_, v)| v.split(',').map(|s| s.trim().to_string()).collect())
  }
}

impl<S: Into<String>> FromIterator<S> for Labels {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型描述解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
}

mod replay;
pub use self::replay::ReplayModel;

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

pub enum ModelWrapper {
  Replay(ReplayModel),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "model_yolo26")]
    {
      if url.scheme() == Yolo26Builder::SCHEME {
        let model = Yolo26Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Yolo26(model));
      }
    }

    if url.scheme() == ReplayModel::SCHEME {
      return Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?));
    }

    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  fn infer(&self, input: &RgbImage) -> Result<DetectResult, ModelError> {
    match self {
      ModelWrapper::Replay(model) => model.infer(input),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.infer(input),
    }
  }

  fn labels(&self) -> &Labels {
    match self {
      ModelWrapper::Replay(model) => model.labels(),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.labels(),
    }
  }
}

pub type SharedModel = Arc<dyn Model>;

/// 检测流程使用的全部模型，启动时加载一次，之后只读共享
#[derive(Clone)]
pub struct Models {
  /// 笔记本整机区域，缺省时直接在整帧上扫描缺陷
  pub laptop: Option<SharedModel>,
  pub logo: SharedModel,
  /// 同时输出 lot / asset / barcode 框的模型
  pub lot_asset: SharedModel,
  pub serial_region: SharedModel,
  pub serial: SharedModel,
  pub top_bottom: SharedModel,
  pub keyboard: SharedModel,
  /// 屏幕缺陷模型可选，缺省时屏幕端口不做缺陷扫描
  pub screen: Option<SharedModel>,
}

fn load_model(name: &str, source: &str) -> Result<SharedModel, ModelError> {
  info!("加载模型 {}: {}", name, source);
  let url =
    Url::parse(source).map_err(|e| ModelError::ModelPathError(format!("{}: {}", source, e)))?;
  Ok(Arc::new(ModelWrapper::from_url(&url)?))
}

impl Models {
  pub fn load(sources: &ModelSources) -> Result<Self, ModelError> {
    let laptop = match &sources.laptop {
      Some(s) => Some(load_model("laptop", s)?),
      None => None,
    };
    let screen = match &sources.screen {
      Some(s) => Some(load_model("screen", s)?),
      None => None,
    };

    Ok(Self {
      laptop,
      logo: load_model("logo", &sources.logo)?,
      lot_asset: load_model("lot_asset", &sources.lot_asset)?,
      serial_region: load_model("serial_region", &sources.serial_region)?,
      serial: load_model("serial", &sources.serial)?,
      top_bottom: load_model("top_bottom", &sources.top_bottom)?,
      keyboard: load_model("keyboard", &sources.keyboard)?,
      screen,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_resolve_both_ways() {
    let labels: Labels = ["chip", "dent", "missing", "scratch", "stain"].into_iter().collect();
    assert_eq!(labels.id_of("scratch"), Some(3));
    assert_eq!(labels.name(4), Some("stain"));
    assert_eq!(labels.name(5), None);
    assert_eq!(labels.id_of("crack"), None);
  }

  #[test]
  fn labels_from_query() {
    let url = Url::parse("replay:///tmp/a.json?labels=lot,%20asset,barcode").unwrap();
    let labels = Labels::from_query(&url).unwrap();
    assert_eq!(labels.id_of("asset"), Some(1));
    assert_eq!(labels.len(), 3);
  }

  #[test]
  fn first_of_follows_model_order() {
    let labels: Labels = ["lot", "asset"].into_iter().collect();
    let item = |class_id, x| DetectItem {
      class_id,
      score: 0.5,
      bbox: [x, 0.0, x + 1.0, 1.0],
      polygon: None,
    };
    let result = DetectResult::from(vec![item(1, 0.0), item(0, 5.0), item(0, 9.0)]);
    assert_eq!(result.first_of(&labels, "lot").unwrap().bbox[0], 5.0);
    assert_eq!(result.first().unwrap().class_id, 1);
    assert!(result.first_of(&labels, "barcode").is_none());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("onnx:///models/a.onnx").unwrap();
    assert!(matches!(
      ModelWrapper::from_url(&url),
      Err(ModelError::SchemeMismatch(_))
    ));
  }
}
