// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect/region.rs - 区域定位
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
use tracing::debug;

use crate::{
  detect::{BBox, DetectError},
  model::{DetectResult, Labels, Model},
};

/// 父图像中的一块区域及其截图
#[derive(Debug, Clone)]
pub struct Region {
  pub bbox: BBox,
  pub image: RgbImage,
}

impl Region {
  /// 将浮点框裁剪到图像内并截图，框落在图像外时视为未找到
  pub fn crop(image: &RgbImage, bbox: [f32; 4]) -> Result<Self, DetectError> {
    let Some(bbox) = BBox::from_xyxy_clamped(bbox, image.width(), image.height()) else {
      debug!("区域 {:?} 在 {}x{} 图像内退化", bbox, image.width(), image.height());
      return Err(DetectError::RegionNotFound);
    };
    Ok(Self {
      bbox,
      image: bbox.crop(image),
    })
  }
}

/// 运行一次单目标检测模型，取模型输出的第一个框作为感兴趣区域
pub fn locate_region(image: &RgbImage, model: &dyn Model) -> Result<Region, DetectError> {
  let result = model.infer(image)?;
  region_from_result(image, &result, None)
}

/// 在已有推理结果中查找区域，`class_name` 为 None 时取第一个框
pub fn region_from_result(
  image: &RgbImage,
  result: &DetectResult,
  class_name: Option<(&str, &Labels)>,
) -> Result<Region, DetectError> {
  let item = match class_name {
    Some((name, labels)) => result.first_of(labels, name),
    None => result.first(),
  };
  let item = item.ok_or(DetectError::RegionNotFound)?;
  Region::crop(image, item.bbox)
}
