// 该文件是 Shouyu （手语） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "v4l2_capture", feature = "image_sequence"))]
use crate::FromUrlWithScheme;

#[cfg(feature = "image_sequence")]
mod image_sequence;
#[cfg(feature = "image_sequence")]
pub use self::image_sequence::{ImageSequenceBuilder, ImageSequenceCapture};

#[cfg(feature = "v4l2_capture")]
mod v4l2_capture;
#[cfg(feature = "v4l2_capture")]
pub use self::v4l2_capture::{V4l2Capture, V4l2CaptureBuilder};

/// 帧数据
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 采集时刻（单调时钟）
  pub captured_at: Instant,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, captured_at: Instant) -> Self {
    Self {
      image,
      index,
      captured_at,
    }
  }
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
  #[error("无法打开采集设备 {0}: {1}")]
  OpenError(String, std::io::Error),
  #[error("采集失败: {0}")]
  CaptureFailure(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 采集源：`None` 表示流正常结束，`Some(Err(..))` 表示设备故障
pub trait CaptureSource: Iterator<Item = Result<Frame, CaptureError>> {
  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率（如果适用）
  fn fps(&self) -> Option<f64>;
}

/// 按摄像头编号打开采集源
pub enum CaptureOpener {
  #[cfg(feature = "v4l2_capture")]
  V4l2(V4l2CaptureBuilder),
  #[cfg(feature = "image_sequence")]
  ImageSequence(ImageSequenceBuilder),
}

impl FromUrl for CaptureOpener {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "v4l2_capture")]
    {
      if url.scheme() == V4l2CaptureBuilder::SCHEME {
        return Ok(CaptureOpener::V4l2(V4l2CaptureBuilder::from_url(url)?));
      }
    }
    #[cfg(feature = "image_sequence")]
    {
      if url.scheme() == ImageSequenceBuilder::SCHEME {
        return Ok(CaptureOpener::ImageSequence(ImageSequenceBuilder::from_url(
          url,
        )?));
      }
    }
    Err(CaptureError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl CaptureOpener {
  pub fn open(&self, camera: u32) -> Result<CaptureWrapper, CaptureError> {
    match self {
      #[cfg(feature = "v4l2_capture")]
      CaptureOpener::V4l2(builder) => builder.open(camera).map(CaptureWrapper::V4l2),
      #[cfg(feature = "image_sequence")]
      CaptureOpener::ImageSequence(builder) => {
        builder.open(camera).map(CaptureWrapper::ImageSequence)
      }
      #[allow(unreachable_patterns)]
      _ => {
        let _ = camera;
        Err(CaptureError::SchemeMismatch("没有启用任何采集源".to_string()))
      }
    }
  }
}

pub enum CaptureWrapper {
  #[cfg(feature = "v4l2_capture")]
  V4l2(V4l2Capture),
  #[cfg(feature = "image_sequence")]
  ImageSequence(ImageSequenceCapture),
}

impl Iterator for CaptureWrapper {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "v4l2_capture")]
      CaptureWrapper::V4l2(capture) => capture.next(),
      #[cfg(feature = "image_sequence")]
      CaptureWrapper::ImageSequence(capture) => capture.next(),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }
}

impl CaptureSource for CaptureWrapper {
  fn width(&self) -> u32 {
    match self {
      #[cfg(feature = "v4l2_capture")]
      CaptureWrapper::V4l2(capture) => capture.width(),
      #[cfg(feature = "image_sequence")]
      CaptureWrapper::ImageSequence(capture) => capture.width(),
      #[allow(unreachable_patterns)]
      _ => 0,
    }
  }

  fn height(&self) -> u32 {
    match self {
      #[cfg(feature = "v4l2_capture")]
      CaptureWrapper::V4l2(capture) => capture.height(),
      #[cfg(feature = "image_sequence")]
      CaptureWrapper::ImageSequence(capture) => capture.height(),
      #[allow(unreachable_patterns)]
      _ => 0,
    }
  }

  fn fps(&self) -> Option<f64> {
    match self {
      #[cfg(feature = "v4l2_capture")]
      CaptureWrapper::V4l2(capture) => capture.fps(),
      #[cfg(feature = "image_sequence")]
      CaptureWrapper::ImageSequence(capture) => capture.fps(),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }
}
