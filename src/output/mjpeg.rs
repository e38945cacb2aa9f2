// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/mjpeg.rs - MJPEG 多部分流输出
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
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::output::{Delivery, Render};

/// multipart 分隔符
pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum MjpegOutputError {
  #[error("JPEG 编码失败: {0}")]
  EncodeError(#[from] image::ImageError),
}

/// 流在中途被服务端终止
#[derive(Error, Debug, Clone)]
#[error("视频流中止: {0}")]
pub struct StreamAborted(pub String);

pub type StreamItem = Result<Vec<u8>, StreamAborted>;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
  Ok(buffer)
}

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
  let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
  let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
  part.extend_from_slice(header.as_bytes());
  part.extend_from_slice(jpeg);
  part.extend_from_slice(b"\r\n");
  part
}

/// 把标注后的帧编码成 JPEG 推入 HTTP 响应体
///
/// 通道容量由调用方决定；`blocking_send` 在消费端变慢时会阻塞帧循环，
/// 因此必须在阻塞线程中使用。
pub struct MjpegChannelOutput {
  tx: Sender<StreamItem>,
  quality: u8,
  frames_sent: u64,
}

impl MjpegChannelOutput {
  pub fn new(tx: Sender<StreamItem>, quality: u8) -> Self {
    Self {
      tx,
      quality,
      frames_sent: 0,
    }
  }

  pub fn frames_sent(&self) -> u64 {
    self.frames_sent
  }

  /// 以错误结束响应体，客户端会看到连接异常断开
  pub fn abort(&self, reason: String) {
    warn!("终止视频流: {}", reason);
    let _ = self.tx.blocking_send(Err(StreamAborted(reason)));
  }
}

impl Render for MjpegChannelOutput {
  type Error = MjpegOutputError;

  fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  fn render_frame(&mut self, frame: &RgbImage) -> Result<Delivery, Self::Error> {
    let jpeg = encode_jpeg(frame, self.quality)?;
    if self.tx.blocking_send(Ok(multipart_part(&jpeg))).is_err() {
      debug!("客户端已断开, 共发送 {} 帧", self.frames_sent);
      return Ok(Delivery::Closed);
    }
    self.frames_sent += 1;
    Ok(Delivery::Delivered)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn part_is_framed_by_boundary() {
    let part = multipart_part(b"JPEG");
    assert_eq!(
      part,
      b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec()
    );
    assert!(CONTENT_TYPE.ends_with(BOUNDARY));
  }

  #[test]
  fn encoded_frame_is_jpeg() {
    let image = RgbImage::from_pixel(16, 16, image::Rgb([90, 120, 200]));
    let jpeg = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 16));
  }

  #[test]
  fn closed_receiver_reports_closed() {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let mut output = MjpegChannelOutput::new(tx, DEFAULT_JPEG_QUALITY);
    drop(rx);
    assert!(output.is_closed());
    let image = RgbImage::new(8, 8);
    assert_eq!(output.render_frame(&image).unwrap(), Delivery::Closed);
    assert_eq!(output.frames_sent(), 0);
  }

  #[test]
  fn frames_reach_the_receiver() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(2);
    let mut output = MjpegChannelOutput::new(tx, DEFAULT_JPEG_QUALITY);
    let image = RgbImage::new(8, 8);
    assert_eq!(output.render_frame(&image).unwrap(), Delivery::Delivered);
    output.abort("测试".to_string());

    let part = rx.blocking_recv().unwrap().unwrap();
    assert!(part.starts_with(b"--frame\r\n"));
    assert!(rx.blocking_recv().unwrap().is_err());
  }
}
