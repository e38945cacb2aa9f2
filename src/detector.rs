// 该文件是 Shouyu （手语） 项目的一部分。
// src/detector.rs - 手部关键点检测器
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

use std::str::FromStr;

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  hand::{Landmark, LandmarkSet},
};

mod replay;
mod subprocess;
pub use self::replay::{ReplayDetector, ReplayDetectorBuilder};
pub use self::subprocess::{SubprocessDetector, SubprocessDetectorBuilder};

pub trait HandDetector {
  /// 每只手的关键点数量
  fn landmark_count(&self) -> usize;

  /// 返回检测到的所有手，顺序即检测器报告的顺序
  fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>, DetectorError>;
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
  #[error("无法启动检测进程: {0}")]
  SpawnError(std::io::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("检测结果解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("检测进程未就绪: {0}")]
  NotReady(String),
  #[error("检测进程已退出")]
  ProcessExited,
  #[error("检测进程报告错误: {0}")]
  RemoteError(String),
}

/// 检测进程每帧输出的一行 JSON
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResponse {
  #[serde(default)]
  pub hands: Vec<HandJson>,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandJson {
  #[serde(default)]
  pub score: Option<f32>,
  pub landmarks: Vec<Landmark>,
}

impl DetectionResponse {
  pub fn into_hands(self, min_confidence: f32) -> Result<Vec<LandmarkSet>, DetectorError> {
    if let Some(error) = self.error {
      return Err(DetectorError::RemoteError(error));
    }

    Ok(
      self
        .hands
        .into_iter()
        .filter(|hand| hand.score.is_none_or(|score| score >= min_confidence))
        .map(|hand| LandmarkSet::from(hand.landmarks))
        .collect(),
    )
  }
}

pub(crate) fn query_value<T: FromStr>(url: &Url, key: &str) -> Result<Option<T>, DetectorError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v.parse().map(Some).map_err(|_| {
      DetectorError::InvalidParameter(format!("{} 的取值 '{}' 无效", key, v))
    }),
    None => Ok(None),
  }
}

pub enum DetectorBuilder {
  Subprocess(SubprocessDetectorBuilder),
  Replay(ReplayDetectorBuilder),
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let scheme = url.scheme();
    if scheme == SubprocessDetectorBuilder::SCHEME {
      Ok(DetectorBuilder::Subprocess(
        SubprocessDetectorBuilder::from_url(url)?,
      ))
    } else if scheme == ReplayDetectorBuilder::SCHEME {
      Ok(DetectorBuilder::Replay(ReplayDetectorBuilder::from_url(
        url,
      )?))
    } else {
      Err(DetectorError::SchemeMismatch(scheme.to_string()))
    }
  }
}

impl DetectorBuilder {
  pub fn landmark_count(&self) -> usize {
    match self {
      DetectorBuilder::Subprocess(builder) => builder.landmark_count(),
      DetectorBuilder::Replay(builder) => builder.landmark_count(),
    }
  }

  /// 每个视频流各自构建一个检测器实例
  pub fn build(&self) -> Result<DetectorWrapper, DetectorError> {
    match self {
      DetectorBuilder::Subprocess(builder) => builder.build().map(DetectorWrapper::Subprocess),
      DetectorBuilder::Replay(builder) => builder.build().map(DetectorWrapper::Replay),
    }
  }
}

pub enum DetectorWrapper {
  Subprocess(SubprocessDetector),
  Replay(ReplayDetector),
}

impl HandDetector for DetectorWrapper {
  fn landmark_count(&self) -> usize {
    match self {
      DetectorWrapper::Subprocess(detector) => detector.landmark_count(),
      DetectorWrapper::Replay(detector) => detector.landmark_count(),
    }
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>, DetectorError> {
    match self {
      DetectorWrapper::Subprocess(detector) => detector.detect(image),
      DetectorWrapper::Replay(detector) => detector.detect(image),
    }
  }
}
