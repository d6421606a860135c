// 该文件是 Jianyan （检验） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 检测模型
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

use std::sync::{Mutex, PoisonError};

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Labels, Model, ModelError},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_OBJECT_THRESH: f32 = 0.3;

/// NPU 上下文不可并发推理，用互斥锁串行化同一模型的调用
pub struct Yolo26 {
  context: Mutex<Context>,
  labels: Labels,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for Yolo26Error {
  fn from(err: std::io::Error) -> Self {
    Yolo26Error::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for Yolo26Error {
  fn from(err: rknpu::Error) -> Self {
    Yolo26Error::RknnError(err)
  }
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  labels: Labels,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let labels = Labels::from_query(url).unwrap_or_default();
    if labels.is_empty() {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型 {} 缺少 labels 参数",
        url.path()
      )));
    }

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      labels,
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!(" 查询 SDK 版本失败: {}", e);
        return Err(Yolo26Error::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成, 类别数: {}", self.labels.len());
    Ok(Yolo26 {
      context: Mutex::new(context),
      labels: self.labels,
    })
  }
}

/// 根据张量大小匹配回归和分类输出
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

impl Yolo26 {
  fn postprocess(&self, output: rknpu::Output, width: f32, height: f32) -> DetectResult {
    let class_num = self.labels.len();
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let reg_expected = 4 * spatial;
      let cls_expected = class_num * spatial;

      // 输出顺序可能不同，需要根据张量大小判断回归与分类
      let (tensor1, tensor2) = match (
        output.get_f32(head_idx * 2),
        output.get_f32(head_idx * 2 + 1),
      ) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
          error!("获取检测头 {} 输出失败: {}", head_idx, e);
          continue;
        }
      };

      let Some((reg, cls)) = match_reg_cls_tensors(tensor1, tensor2, reg_expected, cls_expected)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - {}, {}, 期望回归: {}, 期望分类: {}",
          head_idx,
          tensor1.len(),
          tensor2.len(),
          reg_expected,
          cls_expected
        );
        continue;
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let mut max_logit = f32::MIN;
          let mut class_id = 0usize;
          for c in 0..class_num {
            let logit = cls[c * spatial + idx];
            if logit > max_logit {
              max_logit = logit;
              class_id = c;
            }
          }
          let score = sigmoid(max_logit);
          if score <= YOLO26_OBJECT_THRESH {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;
          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

          // 映射回原图像素坐标
          items.push(DetectItem {
            class_id: class_id as u32,
            score,
            bbox: [
              xmin / YOLO26_INPUT_W * width,
              ymin / YOLO26_INPUT_H * height,
              xmax / YOLO26_INPUT_W * width,
              ymax / YOLO26_INPUT_H * height,
            ],
            polygon: None,
          });
        }
      }
    }

    // 按置信度降序，保证“第一个框”即最可信的框
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    debug!("检测到 {} 个物体", items.len());
    DetectResult::from(items)
  }
}

impl Model for Yolo26 {
  fn infer(&self, input: &RgbImage) -> Result<DetectResult, ModelError> {
    let resized = image::imageops::resize(
      input,
      YOLO26_INPUT_W as u32,
      YOLO26_INPUT_H as u32,
      FilterType::Triangle,
    );

    let context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
    context
      .set_input(
        0,
        resized.as_raw(),
        rknpu::TensorFormat::NHWC,
        TensorType::UInt8,
      )
      .map_err(Yolo26Error::from)?;
    context.run().map_err(Yolo26Error::from)?;
    let output = context.get_outputs().map_err(Yolo26Error::from)?;

    Ok(self.postprocess(output, input.width() as f32, input.height() as f32))
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
