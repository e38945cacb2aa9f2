// 该文件是 Shouyu （手语） 项目的一部分。
// src/detector/replay.rs - 回放关键点检测结果
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

use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::{DetectionResponse, DetectorError, HandDetector, query_value},
  hand::{HAND_LANDMARK_COUNT, LandmarkSet},
};

/// 从 JSON Lines 文件回放检测结果，每行对应一帧，格式与子进程检测器输出相同
#[derive(Debug, Clone)]
pub struct ReplayDetectorBuilder {
  path: PathBuf,
  landmarks: usize,
  looping: bool,
}

impl FromUrlWithScheme for ReplayDetectorBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(ReplayDetectorBuilder {
      path: PathBuf::from(url.path()),
      landmarks: query_value(url, "landmarks")?.unwrap_or(HAND_LANDMARK_COUNT),
      looping: url.query_pairs().any(|(k, _)| k == "loop"),
    })
  }
}

impl ReplayDetectorBuilder {
  pub fn landmark_count(&self) -> usize {
    self.landmarks
  }

  pub fn build(&self) -> Result<ReplayDetector, DetectorError> {
    info!("读取回放文件: {}", self.path.display());
    let content = std::fs::read_to_string(&self.path)?;
    let frames = content
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(serde_json::from_str::<DetectionResponse>)
      .collect::<Result<Vec<_>, _>>()?;
    info!("回放帧数: {}", frames.len());

    Ok(ReplayDetector {
      frames,
      cursor: 0,
      landmarks: self.landmarks,
      looping: self.looping,
    })
  }
}

pub struct ReplayDetector {
  frames: Vec<DetectionResponse>,
  cursor: usize,
  landmarks: usize,
  looping: bool,
}

impl ReplayDetector {
  pub fn new(frames: Vec<DetectionResponse>, landmarks: usize, looping: bool) -> Self {
    Self {
      frames,
      cursor: 0,
      landmarks,
      looping,
    }
  }
}

impl HandDetector for ReplayDetector {
  fn landmark_count(&self) -> usize {
    self.landmarks
  }

  // 回放结束后视为画面中没有手
  fn detect(&mut self, _image: &RgbImage) -> Result<Vec<LandmarkSet>, DetectorError> {
    if self.cursor >= self.frames.len() {
      if !self.looping || self.frames.is_empty() {
        return Ok(Vec::new());
      }
      debug!("回放到达末尾，从头开始");
      self.cursor = 0;
    }

    let response = self.frames[self.cursor].clone();
    self.cursor += 1;
    response.into_hands(0.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_replay(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hands.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    (dir, path)
  }

  #[test]
  fn replays_lines_in_order_then_empty() {
    let (_dir, path) = write_replay(&[
      r#"{"hands": [{"landmarks": [{"x": 0.1, "y": 0.1}]}]}"#,
      "",
      r#"{"hands": []}"#,
    ]);
    let url = Url::parse(&format!("replay://{}?landmarks=1", path.display())).unwrap();
    let mut detector = ReplayDetectorBuilder::from_url(&url).unwrap().build().unwrap();
    let image = RgbImage::new(4, 4);

    assert_eq!(detector.landmark_count(), 1);
    assert_eq!(detector.detect(&image).unwrap().len(), 1);
    assert!(detector.detect(&image).unwrap().is_empty());
    assert!(detector.detect(&image).unwrap().is_empty());
  }

  #[test]
  fn looping_restarts_from_first_line() {
    let (_dir, path) = write_replay(&[r#"{"hands": [{"landmarks": [{"x": 0.1, "y": 0.1}]}]}"#]);
    let url = Url::parse(&format!("replay://{}?loop", path.display())).unwrap();
    let mut detector = ReplayDetectorBuilder::from_url(&url).unwrap().build().unwrap();
    let image = RgbImage::new(4, 4);

    for _ in 0..3 {
      assert_eq!(detector.detect(&image).unwrap().len(), 1);
    }
  }

  #[test]
  fn malformed_line_fails_at_build() {
    let (_dir, path) = write_replay(&["not json"]);
    let url = Url::parse(&format!("replay://{}", path.display())).unwrap();
    let builder = ReplayDetectorBuilder::from_url(&url).unwrap();
    assert!(matches!(builder.build(), Err(DetectorError::ParseError(_))));
  }
}
