// 该文件是 Jianyan （检验） 项目的一部分。
// src/bin/inspect_station.rs - 多相机检测工位
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

use std::{io::BufRead, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use jianyan::{
  config::StationConfig,
  from_url_str,
  model::Models,
  ocr::{Ocr, OcrWrapper},
  orchestrator::Orchestrator,
  output::{FrameCounter, SinkWrapper, draw::Draw},
  task::{CameraSpec, Station},
};

/// 检测工位参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 工位配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,

  /// 每个端口每隔多少帧输出一次预览日志（0 表示不输出）
  #[arg(long, value_name = "COUNT", default_value_t = 300)]
  pub preview_log_every: u64,
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

  let mut builder = Station::builder(orchestrator)
    .capture_timeout(Duration::from_millis(config.capture_timeout_ms))
    .preview(Arc::new(FrameCounter::new(args.preview_log_every)));
  for camera in &config.cameras {
    info!("端口 {} ({}): {}", camera.port, camera.port.surface(), camera.url);
    builder = builder.camera(CameraSpec::from_url(camera.port, Url::parse(&camera.url)?));
  }
  for sink in &config.sinks {
    info!("输出: {}", sink);
    builder = builder.sink(Box::new(from_url_str::<SinkWrapper>(sink)?));
  }
  let station = Arc::new(builder.start()?);

  {
    let station = station.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      station.stop();
      std::process::exit(0);
    })?;
  }

  info!("输入 c 拍摄检测，q 退出");
  for line in std::io::stdin().lock().lines() {
    match line?.trim() {
      "c" => match station.capture() {
        Ok(ports) => info!("已拍摄端口 {:?}，等待检测完成", ports),
        Err(e) => warn!("拍摄失败: {}", e),
      },
      "q" => break,
      "" => {}
      other => warn!("未知命令: {}", other),
    }
  }

  station.stop();
  info!("共完成 {} 次检测", station.completed_cycles());
  Ok(())
}
