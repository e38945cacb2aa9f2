// 该文件是 Shouyu （手语） 项目的一部分。
// src/detector/subprocess.rs - 子进程关键点检测器
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

//! # 子进程检测器
//!
//! 关键点检测由外部进程完成（例如基于 MediaPipe 的脚本），通过标准输入输出通信：
//!
//! 1. 启动后进程输出一行 `READY`；
//! 2. 每帧写入 12 字节小端头部（宽、高、通道数，均为 `u32`），随后是 RGB 原始数据；
//! 3. 进程回写一行 JSON：
//!    `{"hands": [{"score": 0.9, "landmarks": [{"x": 0.1, "y": 0.2}, ...]}], "error": null}`
//!
//! ```text
//! subprocess:///opt/shouyu/hand_detect.py?python=python3&min_confidence=0.3&landmarks=21
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::{DetectionResponse, DetectorError, HandDetector, query_value},
  hand::{HAND_LANDMARK_COUNT, LandmarkSet},
};

const DEFAULT_PYTHON: &str = "python3";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
const READY_SIGNAL: &str = "READY";
const RGB_CHANNELS: u32 = 3;

#[derive(Debug, Clone)]
pub struct SubprocessDetectorBuilder {
  script: PathBuf,
  python: String,
  min_confidence: f32,
  landmarks: usize,
}

impl FromUrlWithScheme for SubprocessDetectorBuilder {
  const SCHEME: &'static str = "subprocess";
}

impl FromUrl for SubprocessDetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let min_confidence: f32 =
      query_value(url, "min_confidence")?.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    if !(0.0..=1.0).contains(&min_confidence) {
      return Err(DetectorError::InvalidParameter(format!(
        "min_confidence 必须在 0.0 - 1.0 之间: {}",
        min_confidence
      )));
    }

    Ok(SubprocessDetectorBuilder {
      script: PathBuf::from(url.path()),
      python: query_value(url, "python")?.unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
      min_confidence,
      landmarks: query_value(url, "landmarks")?.unwrap_or(HAND_LANDMARK_COUNT),
    })
  }
}

impl SubprocessDetectorBuilder {
  pub fn landmark_count(&self) -> usize {
    self.landmarks
  }

  pub fn build(&self) -> Result<SubprocessDetector, DetectorError> {
    if !self.script.exists() {
      return Err(DetectorError::NotReady(format!(
        "检测脚本不存在: {}",
        self.script.display()
      )));
    }

    info!("启动检测进程: {} {}", self.python, self.script.display());
    let mut process = Command::new(&self.python)
      .arg(&self.script)
      .arg("--min-confidence")
      .arg(self.min_confidence.to_string())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(DetectorError::SpawnError)?;

    let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
      let _ = process.kill();
      return Err(DetectorError::NotReady("无法获取进程标准输入输出".to_string()));
    };
    let mut stdout = BufReader::new(stdout);

    let mut ready_line = String::new();
    let read = stdout.read_line(&mut ready_line)?;
    if read == 0 || ready_line.trim() != READY_SIGNAL {
      let _ = process.kill();
      let _ = process.wait();
      return Err(DetectorError::NotReady(format!(
        "期望 '{}', 收到 '{}'",
        READY_SIGNAL,
        ready_line.trim()
      )));
    }
    info!("检测进程就绪");

    Ok(SubprocessDetector {
      process,
      stdin,
      stdout,
      min_confidence: self.min_confidence,
      landmarks: self.landmarks,
    })
  }
}

pub struct SubprocessDetector {
  process: Child,
  stdin: ChildStdin,
  stdout: BufReader<ChildStdout>,
  min_confidence: f32,
  landmarks: usize,
}

impl HandDetector for SubprocessDetector {
  fn landmark_count(&self) -> usize {
    self.landmarks
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>, DetectorError> {
    let (width, height) = image.dimensions();

    self.stdin.write_all(&width.to_le_bytes())?;
    self.stdin.write_all(&height.to_le_bytes())?;
    self.stdin.write_all(&RGB_CHANNELS.to_le_bytes())?;
    self.stdin.write_all(image.as_raw())?;
    self.stdin.flush()?;

    let mut line = String::new();
    if self.stdout.read_line(&mut line)? == 0 {
      return Err(DetectorError::ProcessExited);
    }

    let response: DetectionResponse = serde_json::from_str(&line)?;
    let hands = response.into_hands(self.min_confidence)?;
    debug!("检测到 {} 只手", hands.len());
    Ok(hands)
  }
}

impl Drop for SubprocessDetector {
  fn drop(&mut self) {
    if let Err(e) = self.process.kill() {
      warn!("结束检测进程失败: {}", e);
    }
    let _ = self.process.wait();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_query_parameters() {
    let url = Url::parse(
      "subprocess:///opt/hand_detect.py?python=/usr/bin/python3.11&min_confidence=0.5&landmarks=21",
    )
    .unwrap();
    let builder = SubprocessDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.script, PathBuf::from("/opt/hand_detect.py"));
    assert_eq!(builder.python, "/usr/bin/python3.11");
    assert_eq!(builder.min_confidence, 0.5);
    assert_eq!(builder.landmark_count(), 21);
  }

  #[test]
  fn defaults_follow_mediapipe_hands() {
    let url = Url::parse("subprocess:///opt/hand_detect.py").unwrap();
    let builder = SubprocessDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.python, DEFAULT_PYTHON);
    assert_eq!(builder.min_confidence, DEFAULT_MIN_CONFIDENCE);
    assert_eq!(builder.landmark_count(), HAND_LANDMARK_COUNT);
  }

  #[test]
  fn rejects_out_of_range_confidence() {
    let url = Url::parse("subprocess:///opt/hand_detect.py?min_confidence=1.5").unwrap();
    assert!(matches!(
      SubprocessDetectorBuilder::from_url(&url),
      Err(DetectorError::InvalidParameter(_))
    ));
  }

  #[test]
  fn missing_script_is_not_ready() {
    let url = Url::parse("subprocess:///nonexistent/hand_detect.py").unwrap();
    let builder = SubprocessDetectorBuilder::from_url(&url).unwrap();
    assert!(matches!(builder.build(), Err(DetectorError::NotReady(_))));
  }
}
