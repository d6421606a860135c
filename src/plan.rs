// 该文件是 Jianyan （检验） 项目的一部分。
// src/plan.rs - 端口检测计划
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frame::CameraPort;

/// 缺陷扫描使用的表面模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
  TopBottom,
  Keyboard,
  Screen,
}

/// 端口上需要执行的提取任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Logo,
  Lot,
  Asset,
  Serial,
  DefectScan(Surface),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
  pub port: CameraPort,
  pub roles: Vec<Role>,
}

/// 端口到任务列表的静态映射，按端口号升序遍历
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PlanEntry>", into = "Vec<PlanEntry>")]
pub struct DetectionPlan {
  entries: BTreeMap<CameraPort, Vec<Role>>,
}

impl DetectionPlan {
  pub fn empty() -> Self {
    Self {
      entries: BTreeMap::new(),
    }
  }

  pub fn with(mut self, port: CameraPort, roles: impl IntoIterator<Item = Role>) -> Self {
    self.entries.insert(port, roles.into_iter().collect());
    self
  }

  /// 端口的任务列表，未配置的端口没有任务
  pub fn roles(&self, port: CameraPort) -> &[Role] {
    self.entries.get(&port).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn ports(&self) -> impl Iterator<Item = CameraPort> + '_ {
    self.entries.keys().copied()
  }
}

impl Default for DetectionPlan {
  fn default() -> Self {
    Self::empty()
      .with(
        CameraPort::TOP,
        [
          Role::Logo,
          Role::Lot,
          Role::Asset,
          Role::DefectScan(Surface::TopBottom),
        ],
      )
      .with(
        CameraPort::BOTTOM,
        [Role::Serial, Role::DefectScan(Surface::TopBottom)],
      )
      .with(CameraPort::KEYBOARD, [Role::DefectScan(Surface::Keyboard)])
      .with(CameraPort::SCREEN, [Role::DefectScan(Surface::Screen)])
  }
}

impl From<Vec<PlanEntry>> for DetectionPlan {
  fn from(entries: Vec<PlanEntry>) -> Self {
    Self {
      entries: entries.into_iter().map(|e| (e.port, e.roles)).collect(),
    }
  }
}

impl From<DetectionPlan> for Vec<PlanEntry> {
  fn from(plan: DetectionPlan) -> Self {
    plan
      .entries
      .into_iter()
      .map(|(port, roles)| PlanEntry { port, roles })
      .collect()
  }
}
