// 该文件是 Shouyu （手语） 项目的一部分。
// src/main.rs - 手语识别 HTTP 服务
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shouyu::{
  FromUrl,
  detector::DetectorBuilder,
  input::CaptureOpener,
  model::GestureModelBuilder,
  output::draw::Overlay,
  server::{self, AppState, StreamSettings},
  text::TextBuffer,
};

const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("检测器: {}", args.detector);
  info!("采集源: {}", args.capture);

  if !(args.hold_seconds.is_finite() && args.hold_seconds > 0.0) {
    bail!("保持时间必须为正数: {}", args.hold_seconds);
  }

  // 模型无法加载时不提供服务
  let classifier = GestureModelBuilder::from_url(&args.model)?
    .build()
    .with_context(|| format!("无法加载模型 {}", args.model))?;
  let detector = DetectorBuilder::from_url(&args.detector)?;
  classifier
    .ensure_input_width(detector.landmark_count() * 2)
    .context("检测器与模型的特征维度不一致")?;
  let capture = CaptureOpener::from_url(&args.capture)?;

  let overlay = match &args.font {
    Some(path) => Overlay::from_font_file(path)
      .with_context(|| format!("无法加载字体 {}", path.display()))?,
    None => {
      info!("使用内置字体");
      Overlay::default()
    }
  };

  let state = AppState {
    text: Arc::new(TextBuffer::new()),
    classifier: Arc::new(classifier),
    detector: Arc::new(detector),
    capture: Arc::new(capture),
    overlay: Arc::new(overlay),
    settings: StreamSettings {
      hold_threshold: Duration::from_secs_f64(args.hold_seconds),
      jpeg_quality: args.jpeg_quality,
      mirror: !args.no_mirror,
    },
    active_streams: Default::default(),
  };

  let listener = tokio::net::TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("无法监听 {}", args.listen))?;
  info!("服务已启动: http://{}", listener.local_addr()?);

  axum::serve(listener, server::router(state))
    .with_graceful_shutdown(async {
      server::shutdown_signal(tokio::signal::ctrl_c()).await;
      // 视频流连接不会自行结束
      std::thread::spawn(|| {
        std::thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .await
    .context("HTTP 服务异常退出")?;

  info!("服务已停止");
  Ok(())
}
