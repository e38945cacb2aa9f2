// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Delivery, Render,
    mjpeg::{DEFAULT_JPEG_QUALITY, encode_jpeg},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数错误: {0}")]
  InvalidParameter(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// `folder:///path/to/dir?quality=90&every=5`
///
/// 标注后的帧按日期保存为 `YYYY/MM/DD/HH-MM-SS-XXXX.jpg`。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  quality: u8,
  every: u32,
  frame_counter: u32,
  stop: Arc<AtomicBool>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut output = DirectoryRecordOutput::new(Path::new(uri.path()));
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "quality" => {
          output.quality = v
            .parse::<u8>()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .ok_or_else(|| {
              DirectoryRecordOutputError::InvalidParameter(format!("quality 的取值 '{}' 无效", v))
            })?;
        }
        "every" => {
          output.every = v.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
            DirectoryRecordOutputError::InvalidParameter(format!("every 的取值 '{}' 无效", v))
          })?;
        }
        _ => {}
      }
    }

    Ok(output)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: &Path) -> Self {
    Self {
      directory: directory.to_path_buf(),
      quality: DEFAULT_JPEG_QUALITY,
      every: 1,
      frame_counter: 0,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 置位后输出视为已关闭，用于 Ctrl+C 停止
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.jpg",
      now.format("%H-%M-%S"),
      self.frame_counter & 0xFFFF
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn is_closed(&self) -> bool {
    self.stop.load(Ordering::SeqCst)
  }

  fn render_frame(&mut self, frame: &RgbImage) -> Result<Delivery, Self::Error> {
    if self.is_closed() {
      return Ok(Delivery::Closed);
    }

    self.frame_counter = self.frame_counter.wrapping_add(1);
    if self.frame_counter % self.every != 0 {
      return Ok(Delivery::Delivered);
    }

    let path = self.frame_path()?;
    std::fs::write(&path, encode_jpeg(frame, self.quality)?)?;
    debug!("保存帧: {}", path.display());
    Ok(Delivery::Delivered)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn saved_files(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files
  }

  #[test]
  fn saves_every_nth_frame_as_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?every=2", dir.path().display())).unwrap();
    let mut output = DirectoryRecordOutput::from_url(&url).unwrap();

    let image = RgbImage::new(16, 16);
    for _ in 0..4 {
      assert_eq!(output.render_frame(&image).unwrap(), Delivery::Delivered);
    }

    let files = saved_files(dir.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|p| p.extension().is_some_and(|e| e == "jpg")));
  }

  #[test]
  fn stop_flag_closes_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut output = DirectoryRecordOutput::new(dir.path());
    output.stop_flag().store(true, Ordering::SeqCst);
    assert!(output.is_closed());
    assert_eq!(
      output.render_frame(&RgbImage::new(4, 4)).unwrap(),
      Delivery::Closed
    );
    assert!(saved_files(dir.path()).is_empty());
  }

  #[test]
  fn rejects_wrong_scheme_and_quality() {
    let url = url::Url::parse("file:///tmp/out").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
    let url = url::Url::parse("folder:///tmp/out?quality=0").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::InvalidParameter(_))
    ));
  }
}
