// 该文件是 Shouyu （手语） 项目的一部分。
// src/bin/record.rs - 无界面的手语识别与记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shouyu::{
  FromUrl,
  detector::DetectorBuilder,
  input::CaptureOpener,
  model::GestureModelBuilder,
  output::{DirectoryRecordOutput, draw::Overlay},
  task::FrameLoop,
  text::TextBuffer,
};

/// 在本地摄像头上运行帧循环，把标注后的画面保存到目录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 手势分类模型
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 手部关键点检测器
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 采集源
  #[arg(long, default_value = "v4l2:///dev/video{camera}", value_name = "SOURCE")]
  pub capture: Url,
  /// 摄像头编号
  #[arg(long, default_value_t = 0)]
  pub camera: u32,
  /// 输出目录，例如 folder:///tmp/shouyu?every=5
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 叠加文字使用的字体，不提供时使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  #[arg(long, default_value_t = 3.0, value_name = "SECONDS")]
  pub hold_seconds: f64,
  #[arg(long)]
  pub no_mirror: bool,

  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("检测器: {}", args.detector);
  info!("采集源: {} (摄像头 {})", args.capture, args.camera);
  info!("输出路径: {}", args.output);
  anyhow::ensure!(
    args.hold_seconds.is_finite() && args.hold_seconds > 0.0,
    "保持时间必须为正数: {}",
    args.hold_seconds
  );

  let classifier = GestureModelBuilder::from_url(&args.model)?
    .build()
    .with_context(|| format!("无法加载模型 {}", args.model))?;
  let detector = DetectorBuilder::from_url(&args.detector)?;
  let overlay = match &args.font {
    Some(path) => Overlay::from_font_file(path)?,
    None => Overlay::default(),
  };

  let text = Arc::new(TextBuffer::new());
  // 维度不一致时不启动检测进程
  let mut frame_loop = FrameLoop::from_builder(&detector, Arc::new(classifier), text.clone())?
    .with_hold_threshold(Duration::from_secs_f64(args.hold_seconds))
    .with_overlay(Arc::new(overlay))
    .with_mirror(!args.no_mirror);

  let capture = CaptureOpener::from_url(&args.capture)?.open(args.camera)?;
  let mut output = DirectoryRecordOutput::from_url(&args.output)?;

  let stop = output.stop_flag();
  ctrlc::set_handler(move || {
    warn!("收到中断信号，准备退出...");
    stop.store(true, Ordering::SeqCst);
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  let limit = if args.frame_number > 0 {
    args.frame_number
  } else {
    usize::MAX
  };
  let exit = frame_loop.run(capture.take(limit), &mut output)?;

  info!("任务完成: {:?}", exit);
  println!("{}", text.read());
  Ok(())
}
