// 该文件是 Jianyan （检验） 项目的一部分。
// src/detect/postprocess.rs - 缺陷过滤与去重
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

use tracing::debug;

use crate::{
  config::DefectScanConfig,
  detect::{BBox, Defect},
};

pub const DEFAULT_TOP_K: usize = 5;

/// 两个框的交并比，并集为零时为 0
pub fn iou(a: &BBox, b: &BBox) -> f64 {
  let inter = a.intersection_area(b);
  let union = a.area() + b.area() - inter;
  if union == 0 {
    return 0.0;
  }
  inter as f64 / union as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefectFilter {
  pub min_area: u64,
  pub iou_threshold: f64,
  pub top_k: usize,
}

impl From<&DefectScanConfig> for DefectFilter {
  fn from(config: &DefectScanConfig) -> Self {
    Self {
      min_area: config.min_area,
      iou_threshold: config.iou_threshold,
      top_k: config.top_k,
    }
  }
}

impl DefectFilter {
  /// 面积过滤、贪心聚类去重，最后按面积降序保留前 `top_k` 个
  ///
  /// 聚类按输入顺序单遍进行：未访问的缺陷开启新簇，其后每个未访问的缺陷
  /// 只要与簇中任一成员的 IoU 超过阈值即并入，簇内保留面积最大者（同面积取先出现的）。
  pub fn apply(&self, defects: Vec<Defect>) -> Vec<Defect> {
    let total = defects.len();
    let mut kept: Vec<Defect> = defects
      .into_iter()
      .filter(|d| d.area() >= self.min_area)
      .collect();
    let after_area = kept.len();

    let mut visited = vec![false; kept.len()];
    let mut survivors = Vec::new();
    for i in 0..kept.len() {
      if visited[i] {
        continue;
      }
      visited[i] = true;
      let mut cluster = vec![i];
      for j in (i + 1)..kept.len() {
        if visited[j] {
          continue;
        }
        if cluster
          .iter()
          .any(|&m| iou(&kept[m].bbox, &kept[j].bbox) > self.iou_threshold)
        {
          visited[j] = true;
          cluster.push(j);
        }
      }

      let mut best = i;
      for &m in &cluster[1..] {
        if kept[m].area() > kept[best].area() {
          best = m;
        }
      }
      survivors.push(best);
    }

    let mut taken: Vec<Option<Defect>> = kept.drain(..).map(Some).collect();
    let mut out: Vec<Defect> = survivors
      .into_iter()
      .filter_map(|i| taken[i].take())
      .collect();
    out.sort_by(|a, b| b.area().cmp(&a.area()));
    out.truncate(self.top_k);

    debug!(
      "缺陷过滤: {} -> 面积 {} -> 去重 {}",
      total,
      after_area,
      out.len()
    );
    out
  }
}

/// 默认保留前 5 个
pub fn filter_defects(defects: Vec<Defect>, min_area: u64, iou_threshold: f64) -> Vec<Defect> {
  DefectFilter {
    min_area,
    iou_threshold,
    top_k: DEFAULT_TOP_K,
  }
  .apply(defects)
}
