// 该文件是 Shouyu （手语） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
  Json, Router,
  body::Body,
  extract::{Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::{
  detector::{DetectorBuilder, DetectorError},
  hold::DEFAULT_HOLD_SECONDS,
  input::{CaptureError, CaptureOpener, CaptureSource},
  model::{ClassifyError, GestureClassifier},
  output::{
    draw::Overlay,
    mjpeg::{CONTENT_TYPE, DEFAULT_JPEG_QUALITY, MjpegChannelOutput, StreamItem},
  },
  task::{FrameLoop, FrameLoopError},
  text::TextBuffer,
};

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("分类器错误: {0}")]
  Classify(#[from] ClassifyError),
  #[error("检测器错误: {0}")]
  Detector(#[from] DetectorError),
  #[error("采集错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("帧循环错误: {0}")]
  FrameLoop(#[from] FrameLoopError),
  #[error("视频流启动失败: {0}")]
  StreamStartup(String),
}

impl IntoResponse for ServerError {
  fn into_response(self) -> Response {
    let status = match &self {
      ServerError::Capture(CaptureError::OpenError(..)) => StatusCode::SERVICE_UNAVAILABLE,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
  }
}

/// 每个视频流使用的参数
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
  pub hold_threshold: Duration,
  pub jpeg_quality: u8,
  pub mirror: bool,
}

impl Default for StreamSettings {
  fn default() -> Self {
    Self {
      hold_threshold: Duration::from_secs_f64(DEFAULT_HOLD_SECONDS),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      mirror: true,
    }
  }
}

/// 所有请求共享的状态；文本缓冲区是帧循环与请求之间唯一共享的可变对象
#[derive(Clone)]
pub struct AppState {
  pub text: Arc<TextBuffer>,
  pub classifier: Arc<GestureClassifier>,
  pub detector: Arc<DetectorBuilder>,
  pub capture: Arc<CaptureOpener>,
  pub overlay: Arc<Overlay>,
  pub settings: StreamSettings,
  /// 正在运行的帧循环数量
  pub active_streams: Arc<AtomicUsize>,
}

impl AppState {
  pub fn active_streams(&self) -> usize {
    self.active_streams.load(Ordering::SeqCst)
  }
}

/// 帧循环线程持有的计数，线程退出时释放
struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
  fn new(counter: Arc<AtomicUsize>) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(counter)
  }
}

impl Drop for StreamGuard {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponse {
  pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoFeedQuery {
  #[serde(default)]
  pub camera: u32,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/video_feed", get(video_feed))
    .route("/get_text", get(get_text))
    .route("/clear_text", post(clear_text))
    .route("/backspace", post(backspace))
    .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
  Json(serde_json::json!({ "status": "ok", "streams": state.active_streams() }))
}

pub async fn get_text(State(state): State<AppState>) -> Json<TextResponse> {
  Json(TextResponse {
    text: state.text.read(),
  })
}

pub async fn clear_text(State(state): State<AppState>) -> Json<TextResponse> {
  state.text.clear();
  info!("清空文本");
  Json(TextResponse {
    text: state.text.read(),
  })
}

pub async fn backspace(State(state): State<AppState>) -> Json<TextResponse> {
  state.text.backspace();
  Json(TextResponse {
    text: state.text.read(),
  })
}

/// 启动一个帧循环，把标注后的帧作为 MJPEG 流返回
///
/// 检测器、分类器与摄像头在返回响应头之前准备好；任何一步失败都直接返回错误响应。
pub async fn video_feed(
  State(state): State<AppState>,
  Query(query): Query<VideoFeedQuery>,
) -> Result<Response, ServerError> {
  let camera = query.camera;
  info!("请求视频流, 摄像头 {}", camera);

  let (tx, rx) = mpsc::channel::<StreamItem>(1);
  let (ready_tx, ready_rx) = oneshot::channel();
  tokio::task::spawn_blocking(move || stream_worker(state, camera, tx, ready_tx));

  ready_rx
    .await
    .map_err(|_| ServerError::StreamStartup("工作线程提前退出".to_string()))??;

  let stream = futures::stream::unfold(rx, |mut rx| async move {
    rx.recv().await.map(|item| (item, rx))
  });
  Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], Body::from_stream(stream)).into_response())
}

fn stream_worker(
  state: AppState,
  camera: u32,
  tx: mpsc::Sender<StreamItem>,
  ready: oneshot::Sender<Result<(), ServerError>>,
) {
  // 最先创建，最后释放：计数归零时摄像头与检测进程都已关闭
  let _guard = StreamGuard::new(state.active_streams.clone());

  let started = (|| -> Result<_, ServerError> {
    // 先校验维度，避免白白启动检测进程
    state
      .classifier
      .ensure_input_width(state.detector.landmark_count() * 2)?;
    let frame_loop =
      FrameLoop::from_builder(&state.detector, state.classifier.clone(), state.text.clone())?
      .with_hold_threshold(state.settings.hold_threshold)
      .with_overlay(state.overlay.clone())
      .with_mirror(state.settings.mirror);
    let capture = state.capture.open(camera)?;
    Ok((frame_loop, capture))
  })();

  let (mut frame_loop, capture) = match started {
    Ok(started) => {
      let _ = ready.send(Ok(()));
      started
    }
    Err(e) => {
      error!("视频流启动失败: {}", e);
      let _ = ready.send(Err(e));
      return;
    }
  };

  info!(
    "摄像头 {} 已就绪: {}x{}",
    camera,
    capture.width(),
    capture.height()
  );
  let mut output = MjpegChannelOutput::new(tx, state.settings.jpeg_quality);
  match frame_loop.run(capture, &mut output) {
    Ok(exit) => info!("摄像头 {} 的视频流结束: {:?}", camera, exit),
    Err(e) => {
      error!("摄像头 {} 的视频流异常终止: {}", camera, e);
      output.abort(e.to_string());
    }
  }
}

/// 等待中断信号；无法注册监听时记录警告并一直等待，服务继续运行
pub async fn shutdown_signal<F>(signal: F)
where
  F: Future<Output = std::io::Result<()>>,
{
  match signal.await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => {
      warn!("无法监听中断信号: {}", e);
      std::future::pending::<()>().await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn signal_registration_failure_keeps_serving() {
    let signal = async { Err(std::io::Error::other("no signal handler")) };
    let waited = tokio::time::timeout(Duration::from_millis(100), shutdown_signal(signal)).await;
    assert!(waited.is_err());
  }

  #[tokio::test]
  async fn received_signal_starts_shutdown() {
    let waited =
      tokio::time::timeout(Duration::from_secs(1), shutdown_signal(async { Ok(()) })).await;
    assert!(waited.is_ok());
  }

  #[test]
  fn stream_guard_counts_running_loops() {
    let counter = Arc::new(AtomicUsize::new(0));
    let first = StreamGuard::new(counter.clone());
    let second = StreamGuard::new(counter.clone());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    drop(first);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    drop(second);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }
}
