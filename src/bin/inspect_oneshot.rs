// 该文件是 Jianyan （检验） 项目的一部分。
// src/bin/inspect_oneshot.rs - 对一组图像执行一次检测
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

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use jianyan::{
  config::StationConfig,
  frame::{CameraPort, Frame},
  from_url_str,
  model::Models,
  ocr::{Ocr, OcrWrapper},
  orchestrator::Orchestrator,
  output::{CycleSink, SinkWrapper, draw::Draw},
};

/// 单次检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 工位配置文件（JSON），相机列表会被忽略
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,

  /// 端口与图像，格式 PORT=PATH，可重复
  #[arg(long = "image", value_name = "PORT=PATH", value_parser = parse_port_image)]
  pub images: Vec<(CameraPort, PathBuf)>,
}

fn parse_port_image(s: &str) -> Result<(CameraPort, PathBuf), String> {
  let (port, path) = s
    .split_once('=')
    .ok_or_else(|| format!("应为 PORT=PATH: {}", s))?;
  let port = port
    .trim()
    .parse::<u8>()
    .map_err(|e| format!("无效端口 {}: {}", port, e))?;
  Ok((CameraPort(port), PathBuf::from(path)))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config = StationConfig::load(&args.config)?;

  let models = Models::load(&config.models)?;
  let ocr: Arc<dyn Ocr> = Arc::new(from_url_str::<OcrWrapper>(&config.ocr)?);
  let draw = match &config.font {
    Some(path) => Draw::from_font_file(path)?,
    None => Draw::default(),
  };
  let orchestrator = Orchestrator::new(models, ocr, config.inspection.clone()).with_draw(draw);

  let mut frames = Vec::with_capacity(args.images.len());
  for (port, path) in &args.images {
    let image = image::open(path)
      .with_context(|| format!("无法读取图像 {}", path.display()))?
      .to_rgb8();
    info!("端口 {}: {} ({}x{})", port, path.display(), image.width(), image.height());
    frames.push((*port, Some(Frame::new(image, *port))));
  }

  let report = orchestrator.run_cycle(frames);

  for sink in &config.sinks {
    let output = from_url_str::<SinkWrapper>(sink)?;
    if let Err(e) = output.on_cycle(&report) {
      error!("输出 {} 失败: {}", sink, e);
    }
  }

  println!("{}", serde_json::to_string_pretty(&report.features)?);
  info!("评级: {}", report.grade);
  Ok(())
}
