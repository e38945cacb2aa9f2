// 该文件是 Shouyu （手语） 项目的一部分。
// src/args.rs - 服务参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Shouyu 手语识别服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:5000", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 手势分类模型，例如 model:///path/to/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 手部关键点检测器
  /// 支持格式:
  /// - subprocess:///path/to/hand_detect.py?python=python3&min_confidence=0.3
  /// - replay:///path/to/landmarks.jsonl?loop
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,

  /// 采集源，{camera} 会被替换为请求中的摄像头编号
  /// 支持格式:
  /// - v4l2:///dev/video{camera}
  /// - image:///path/to/frames?fps=30
  #[arg(long, default_value = "v4l2:///dev/video{camera}", value_name = "SOURCE")]
  pub capture: Url,

  /// 叠加文字使用的 TTF/OTF 字体，不提供时使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 保持同一手势多少秒后提交
  #[arg(long, default_value_t = 3.0, value_name = "SECONDS")]
  pub hold_seconds: f64,

  /// JPEG 编码质量 (1 - 100)
  #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,

  /// 不对画面做水平镜像
  #[arg(long)]
  pub no_mirror: bool,
}
