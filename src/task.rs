// 该文件是 Jianyan （检验） 项目的一部分。
// src/task.rs - 工位：实时预览与检测任务
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

//! 每台相机一个预览线程，独占自己的设备；检测在单独的工作线程中串行执行。
//!
//! 拍摄请求通过通道交给预览线程，由其回传下一帧的副本，
//! 检测路径从不与预览线程共享图像缓冲。

use std::{
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::{CameraPort, Frame},
  input::{CameraWrapper, CaptureSource, InputError},
  orchestrator::Orchestrator,
  output::{CycleSink, PreviewSink},
};

/// 连续读取失败达到该次数后放弃该相机
const MAX_READ_FAILURES: u32 = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum StationError {
  #[error("工位已停止，不再接受拍摄请求")]
  Stopped,
  #[error("检测线程已退出")]
  WorkerGone,
  #[error("无法创建线程: {0}")]
  SpawnError(#[from] std::io::Error),
}

/// 单次拍摄检测的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
  Idle,
  Capturing,
  Detecting,
  Aggregating,
  Done,
}

type OpenCamera = Box<dyn FnOnce() -> Result<Box<dyn CaptureSource>, InputError> + Send>;

/// 相机的端口与打开方式，设备在预览线程内打开
pub struct CameraSpec {
  pub port: CameraPort,
  open: OpenCamera,
}

impl CameraSpec {
  pub fn new<F>(port: CameraPort, open: F) -> Self
  where
    F: FnOnce() -> Result<Box<dyn CaptureSource>, InputError> + Send + 'static,
  {
    Self {
      port,
      open: Box::new(open),
    }
  }

  pub fn from_url(port: CameraPort, url: Url) -> Self {
    Self::new(port, move || {
      let camera = CameraWrapper::from_url(&url)?;
      Ok(Box::new(camera) as Box<dyn CaptureSource>)
    })
  }
}

struct LiveCamera {
  port: CameraPort,
  alive: Arc<AtomicBool>,
  requests: Sender<SyncSender<Frame>>,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl LiveCamera {
  fn spawn(
    spec: CameraSpec,
    stop: Arc<AtomicBool>,
    preview: Option<Arc<dyn PreviewSink>>,
  ) -> Result<Self, StationError> {
    let CameraSpec { port, open } = spec;
    let alive = Arc::new(AtomicBool::new(true));
    let (requests, pending) = mpsc::channel();

    let thread_alive = alive.clone();
    let handle = thread::Builder::new()
      .name(format!("camera-{}", port))
      .spawn(move || {
        match open() {
          Ok(source) => preview_loop(port, source, &stop, preview.as_deref(), &pending),
          Err(e) => error!("端口 {} 相机初始化失败: {}", port, e),
        }
        thread_alive.store(false, Ordering::SeqCst);
        info!("端口 {} 相机已释放", port);
      })?;

    Ok(Self {
      port,
      alive,
      requests,
      handle: Mutex::new(Some(handle)),
    })
  }

  fn is_running(&self) -> bool {
    self.alive.load(Ordering::SeqCst)
  }

  /// 向预览线程请求下一帧，相机不可用时返回 None
  fn request(&self) -> Option<Receiver<Frame>> {
    if !self.is_running() {
      return None;
    }
    let (reply, frame) = mpsc::sync_channel(1);
    self.requests.send(reply).ok()?;
    Some(frame)
  }

  /// 等待请求的帧，最迟到 `deadline`
  fn receive(&self, frame: Receiver<Frame>, deadline: Instant) -> Option<Frame> {
    let timeout = deadline.saturating_duration_since(Instant::now());
    match frame.recv_timeout(timeout) {
      Ok(frame) => Some(frame),
      Err(RecvTimeoutError::Timeout) => {
        warn!("端口 {} 取帧超时", self.port);
        None
      }
      Err(RecvTimeoutError::Disconnected) => {
        warn!("端口 {} 相机已停止", self.port);
        None
      }
    }
  }

  fn join(&self) {
    let handle = self
      .handle
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(handle) = handle
      && handle.join().is_err()
    {
      error!("端口 {} 预览线程异常退出", self.port);
    }
  }
}

fn preview_loop(
  port: CameraPort,
  mut source: Box<dyn CaptureSource>,
  stop: &AtomicBool,
  preview: Option<&dyn PreviewSink>,
  pending: &Receiver<SyncSender<Frame>>,
) {
  info!("端口 {} 开始预览", port);
  let started = Instant::now();
  let mut index = 0;
  let mut failures = 0;

  while !stop.load(Ordering::SeqCst) {
    match source.read_frame() {
      Ok(image) => {
        failures = 0;
        let frame = Frame {
          image,
          port,
          index,
          timestamp_ms: started.elapsed().as_millis() as u64,
        };
        index += 1;

        if let Some(preview) = preview {
          preview.on_frame(&frame);
        }
        while let Ok(reply) = pending.try_recv() {
          debug!("端口 {} 拍摄第 {} 帧", port, frame.index);
          let _ = reply.send(frame.clone());
        }
      }
      Err(e) => {
        failures += 1;
        error!("端口 {} 读取失败 ({}/{}): {}", port, failures, MAX_READ_FAILURES, e);
        if failures >= MAX_READ_FAILURES {
          break;
        }
        thread::sleep(READ_RETRY_DELAY);
      }
    }
  }
  info!("端口 {} 停止预览, 共 {} 帧", port, index);
}

pub struct StationBuilder {
  orchestrator: Orchestrator,
  cameras: Vec<CameraSpec>,
  sinks: Vec<Box<dyn CycleSink>>,
  preview: Option<Arc<dyn PreviewSink>>,
  capture_timeout: Duration,
}

impl StationBuilder {
  pub fn camera(mut self, camera: CameraSpec) -> Self {
    self.cameras.push(camera);
    self
  }

  pub fn sink(mut self, sink: Box<dyn CycleSink>) -> Self {
    self.sinks.push(sink);
    self
  }

  pub fn preview(mut self, preview: Arc<dyn PreviewSink>) -> Self {
    self.preview = Some(preview);
    self
  }

  pub fn capture_timeout(mut self, timeout: Duration) -> Self {
    self.capture_timeout = timeout;
    self
  }

  /// 启动所有预览线程与检测线程
  pub fn start(self) -> Result<Station, StationError> {
    let StationBuilder {
      orchestrator,
      mut cameras,
      sinks,
      preview,
      capture_timeout,
    } = self;
    cameras.sort_by_key(|c| c.port);

    let stop = Arc::new(AtomicBool::new(false));
    let state = Arc::new(Mutex::new(CycleState::Idle));
    let completed = Arc::new(AtomicU64::new(0));

    let (jobs, queue) = mpsc::channel::<Vec<(CameraPort, Option<Frame>)>>();
    let worker = {
      let state = state.clone();
      let completed = completed.clone();
      thread::Builder::new()
        .name("detection".to_string())
        .spawn(move || detection_loop(orchestrator, sinks, queue, &state, &completed))?
    };

    let mut station = Station {
      cameras: Vec::with_capacity(cameras.len()),
      stop,
      accepting: AtomicBool::new(true),
      jobs: Mutex::new(Some(jobs)),
      worker: Mutex::new(Some(worker)),
      state,
      completed,
      capture_timeout,
    };
    // 中途失败时 station 被丢弃，已启动的线程随之停止
    for spec in cameras {
      let camera = LiveCamera::spawn(spec, station.stop.clone(), preview.clone())?;
      station.cameras.push(camera);
    }
    info!("工位启动: {} 台相机", station.cameras.len());
    Ok(station)
  }
}

fn detection_loop(
  orchestrator: Orchestrator,
  sinks: Vec<Box<dyn CycleSink>>,
  queue: Receiver<Vec<(CameraPort, Option<Frame>)>>,
  state: &Mutex<CycleState>,
  completed: &AtomicU64,
) {
  let set_state = |s: CycleState| *state.lock().unwrap_or_else(PoisonError::into_inner) = s;

  for frames in queue {
    set_state(CycleState::Detecting);
    let report = orchestrator.run_cycle(frames);

    set_state(CycleState::Aggregating);
    for (i, sink) in sinks.iter().enumerate() {
      if let Err(e) = sink.on_cycle(&report) {
        error!("第 {} 个输出处理失败: {}", i, e);
      }
    }

    set_state(CycleState::Done);
    completed.fetch_add(1, Ordering::SeqCst);
    set_state(CycleState::Idle);
  }
  debug!("检测线程退出");
}

/// 多相机检测工位
pub struct Station {
  cameras: Vec<LiveCamera>,
  stop: Arc<AtomicBool>,
  accepting: AtomicBool,
  jobs: Mutex<Option<Sender<Vec<(CameraPort, Option<Frame>)>>>>,
  worker: Mutex<Option<JoinHandle<()>>>,
  state: Arc<Mutex<CycleState>>,
  completed: Arc<AtomicU64>,
  capture_timeout: Duration,
}

impl Station {
  pub fn builder(orchestrator: Orchestrator) -> StationBuilder {
    StationBuilder {
      orchestrator,
      cameras: Vec::new(),
      sinks: Vec::new(),
      preview: None,
      capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
    }
  }

  pub fn ports(&self) -> Vec<CameraPort> {
    self.cameras.iter().map(|c| c.port).collect()
  }

  pub fn is_running(&self, port: CameraPort) -> bool {
    self
      .cameras
      .iter()
      .any(|c| c.port == port && c.is_running())
  }

  pub fn state(&self) -> CycleState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 已完成的检测次数
  pub fn completed_cycles(&self) -> u64 {
    self.completed.load(Ordering::SeqCst)
  }

  /// 从所有相机各取一帧并交给检测线程，返回取到画面的端口
  ///
  /// 检测线程空闲时状态进入 `Capturing`，正在检测时保持原状态。
  pub fn capture(&self) -> Result<Vec<CameraPort>, StationError> {
    if !self.accepting.load(Ordering::SeqCst) {
      return Err(StationError::Stopped);
    }

    let marked = self.transition(CycleState::Idle, CycleState::Capturing);
    let result = self.capture_and_queue();
    if result.is_err() && marked {
      self.transition(CycleState::Capturing, CycleState::Idle);
    }
    result
  }

  /// 仅当当前状态为 `from` 时切换到 `to`
  fn transition(&self, from: CycleState, to: CycleState) -> bool {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if *state == from {
      *state = to;
      true
    } else {
      false
    }
  }

  fn capture_and_queue(&self) -> Result<Vec<CameraPort>, StationError> {
    let start = Instant::now();
    let deadline = start + self.capture_timeout;
    // 先向所有相机发出请求，再依次等待
    let requests: Vec<_> = self.cameras.iter().map(|c| (c, c.request())).collect();
    let frames: Vec<_> = requests
      .into_iter()
      .map(|(camera, request)| {
        let frame = request.and_then(|r| camera.receive(r, deadline));
        (camera.port, frame)
      })
      .collect();
    let captured: Vec<_> = frames
      .iter()
      .filter(|(_, frame)| frame.is_some())
      .map(|(port, _)| *port)
      .collect();
    info!(
      "拍摄完成: {}/{} 个端口有画面, 耗时 {:.2?}",
      captured.len(),
      frames.len(),
      start.elapsed()
    );

    let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
    // 等待画面期间可能已经发出停止
    if !self.accepting.load(Ordering::SeqCst) {
      return Err(StationError::Stopped);
    }
    let jobs = jobs.as_ref().ok_or(StationError::Stopped)?;
    jobs.send(frames).map_err(|_| StationError::WorkerGone)?;
    Ok(captured)
  }

  /// 停止接受拍摄，关闭全部相机，并等待进行中的检测完成
  pub fn stop(&self) {
    if self.accepting.swap(false, Ordering::SeqCst) {
      info!("停止工位...");
    }
    self.stop.store(true, Ordering::SeqCst);
    for camera in &self.cameras {
      camera.join();
    }

    drop(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).take());
    let worker = self
      .worker
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(worker) = worker {
      if worker.join().is_err() {
        error!("检测线程异常退出");
      }
      info!("工位已停止");
    }
  }
}

impl Drop for Station {
  fn drop(&mut self) {
    self.stop();
  }
}
