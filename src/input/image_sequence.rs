// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
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
use std::time::{Duration, Instant};

use image::ImageReader;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureError, CaptureSource, Frame},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// `image:///path/to/frames?fps=30`
///
/// 按文件名顺序读取目录中的图片，读完即视为流结束。
#[derive(Debug, Clone)]
pub struct ImageSequenceBuilder {
  directory: PathBuf,
  fps: Option<f64>,
}

impl FromUrlWithScheme for ImageSequenceBuilder {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSequenceBuilder {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CaptureError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let fps = match url.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => {
        let fps = v
          .parse::<f64>()
          .map_err(|_| CaptureError::InvalidParameter(format!("fps 的取值 '{}' 无效", v)))?;
        if fps <= 0.0 {
          return Err(CaptureError::InvalidParameter(format!(
            "fps 必须大于 0: {}",
            fps
          )));
        }
        Some(fps)
      }
      None => None,
    };

    Ok(ImageSequenceBuilder {
      directory: PathBuf::from(url.path()),
      fps,
    })
  }
}

impl ImageSequenceBuilder {
  pub fn open(&self, camera: u32) -> Result<ImageSequenceCapture, CaptureError> {
    debug!("图像序列忽略摄像头编号 {}", camera);
    ImageSequenceCapture::new(&self.directory, self.fps)
  }
}

pub struct ImageSequenceCapture {
  files: std::vec::IntoIter<PathBuf>,
  interval: Option<Duration>,
  next_deadline: Option<Instant>,
  frame_index: u64,
  width: u32,
  height: u32,
  fps: Option<f64>,
}

impl ImageSequenceCapture {
  pub fn new(directory: &Path, fps: Option<f64>) -> Result<Self, CaptureError> {
    let mut files = std::fs::read_dir(directory)
      .map_err(|e| CaptureError::OpenError(directory.display().to_string(), e))?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
      })
      .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
      warn!("目录中没有图片: {}", directory.display());
    }

    let (width, height) = match files.first() {
      Some(first) => image::image_dimensions(first)?,
      None => (0, 0),
    };
    info!(
      "图像序列: {} 张, {}x{}",
      files.len(),
      width,
      height
    );

    Ok(Self {
      files: files.into_iter(),
      interval: fps.map(|fps| Duration::from_secs_f64(1.0 / fps)),
      next_deadline: None,
      frame_index: 0,
      width,
      height,
      fps,
    })
  }

  // 按设定帧率节流
  fn pace(&mut self) {
    let Some(interval) = self.interval else {
      return;
    };
    let now = Instant::now();
    if let Some(deadline) = self.next_deadline
      && deadline > now
    {
      std::thread::sleep(deadline - now);
    }
    self.next_deadline = Some(self.next_deadline.unwrap_or(now).max(now) + interval);
  }
}

impl Iterator for ImageSequenceCapture {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    self.pace();

    let image = match ImageReader::open(&path)
      .map_err(CaptureError::from)
      .and_then(|reader| reader.decode().map_err(CaptureError::from))
    {
      Ok(image) => image.into_rgb8(),
      Err(e) => return Some(Err(e)),
    };

    let frame = Frame::new(image, self.frame_index, Instant::now());
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl CaptureSource for ImageSequenceCapture {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }
}
