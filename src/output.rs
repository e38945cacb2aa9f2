// 该文件是 Shouyu （手语） 项目的一部分。
// src/output.rs - 输出定义
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

pub mod draw;
pub mod mjpeg;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 一帧是否送达消费端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  Delivered,
  /// 消费端已关闭，帧循环应当停止
  Closed,
}

pub trait Render {
  type Error;

  /// 在采集下一帧之前检查，关闭后不再产生任何帧
  fn is_closed(&self) -> bool {
    false
  }

  fn render_frame(&mut self, frame: &RgbImage) -> Result<Delivery, Self::Error>;
}
