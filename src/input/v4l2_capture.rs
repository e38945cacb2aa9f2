// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/v4l2_capture.rs - V4L2 摄像头采集
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureError, CaptureSource, Frame},
};

const CAMERA_PLACEHOLDER: &str = "{camera}";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

/// `v4l2:///dev/video{camera}?width=640&height=480`
///
/// 路径中的 `{camera}` 会被替换为请求的摄像头编号；没有占位符时编号直接追加在路径末尾。
#[derive(Debug, Clone)]
pub struct V4l2CaptureBuilder {
  device_template: String,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4l2CaptureBuilder {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2CaptureBuilder {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CaptureError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    // `{` `}` 在 URL 路径中会被百分号编码
    let device_template = urlencoding::decode(url.path())
      .map_err(|e| CaptureError::InvalidParameter(format!("设备路径解码失败: {}", e)))?
      .into_owned();

    let mut builder = V4l2CaptureBuilder {
      device_template,
      width: DEFAULT_WIDTH,
      height: DEFAULT_HEIGHT,
    };

    for (k, v) in url.query_pairs() {
      let parse = |v: &str| {
        v.parse::<u32>()
          .map_err(|_| CaptureError::InvalidParameter(format!("{} 的取值 '{}' 无效", k, v)))
      };
      match k.as_ref() {
        "width" => builder.width = parse(&v)?,
        "height" => builder.height = parse(&v)?,
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl V4l2CaptureBuilder {
  pub fn device_path(&self, camera: u32) -> String {
    if self.device_template.contains(CAMERA_PLACEHOLDER) {
      self
        .device_template
        .replace(CAMERA_PLACEHOLDER, &camera.to_string())
    } else {
      format!("{}{}", self.device_template, camera)
    }
  }

  pub fn open(&self, camera: u32) -> Result<V4l2Capture, CaptureError> {
    V4l2Capture::new(&self.device_path(camera), self.width, self.height)
  }
}

/// V4L2 摄像头采集源
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Box<Device> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Capture {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  device_path: String,
  frame_index: u64,
  width: u32,
  height: u32,
}

impl V4l2Capture {
  pub fn new(device_path: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
    info!("打开摄像头: {}", device_path);
    let device = Box::pin(
      Device::with_path(device_path)
        .map_err(|e| CaptureError::OpenError(device_path.to_string(), e))?,
    );

    // 设置视频格式
    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(CaptureError::OpenError(
        device_path.to_string(),
        std::io::Error::other(format!("设备不支持 YUYV 格式, 实际为 {}", format.fourcc)),
      ));
    }
    info!("摄像头格式: {}x{} {}", format.width, format.height, format.fourcc);

    let mut capture = Self {
      device,
      stream: None,
      device_path: device_path.to_string(),
      frame_index: 0,
      width: format.width,
      height: format.height,
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 存储在同一个结构体中，并在 Drop 中先于 device 释放
    let device_ref: &Device = &capture.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, STREAM_BUFFERS)
        .map_err(|e| CaptureError::OpenError(device_path.to_string(), e))?
    };

    capture.stream = Some(stream);
    Ok(capture)
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for V4l2Capture {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
    info!("释放摄像头: {}", self.device_path);
  }
}

impl Iterator for V4l2Capture {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    match stream.next() {
      Ok((buffer, meta)) => {
        let captured_at = Instant::now();
        debug!("采集第 {} 帧, 序号 {}", self.frame_index, meta.sequence);
        let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);

        let Some(image) = RgbImage::from_raw(self.width, self.height, rgb_data) else {
          return Some(Err(CaptureError::CaptureFailure(format!(
            "帧数据长度不足: {} 字节",
            buffer.len()
          ))));
        };

        let frame = Frame::new(image, self.frame_index, captured_at);
        self.frame_index += 1;
        Some(Ok(frame))
      }
      Err(e) => Some(Err(CaptureError::CaptureFailure(format!(
        "{}: {}",
        self.device_path, e
      )))),
    }
  }
}

impl CaptureSource for V4l2Capture {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(30.0) // V4L2 默认帧率
  }
}
