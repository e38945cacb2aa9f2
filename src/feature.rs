// 该文件是 Shouyu （手语） 项目的一部分。
// src/feature.rs - 关键点特征归一化
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

use thiserror::Error;

use crate::hand::LandmarkSet;

#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
  #[error("无效输入: 关键点集合为空")]
  InvalidInput,
}

/// 平移归一化后的特征向量，排列为 [x0, y0, x1, y1, ...]
///
/// 分类器按该交错顺序训练，不能调换。
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
  data: Box<[f32]>,
}

impl FeatureVector {
  /// 每个坐标轴分别减去该轴上的最小值，不做缩放或旋转归一化
  pub fn from_landmarks(landmarks: &LandmarkSet) -> Result<Self, FeatureError> {
    if landmarks.is_empty() {
      return Err(FeatureError::InvalidInput);
    }

    let (min_x, min_y) = landmarks
      .iter()
      .fold((f32::INFINITY, f32::INFINITY), |(mx, my), p| {
        (mx.min(p.x), my.min(p.y))
      });

    let mut data = Vec::with_capacity(landmarks.len() * 2);
    for point in landmarks.iter() {
      data.push(point.x - min_x);
      data.push(point.y - min_y);
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[f32]> for FeatureVector {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl From<Vec<f32>> for FeatureVector {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hand(points: &[(f32, f32)]) -> LandmarkSet {
    points.iter().copied().collect()
  }

  #[test]
  fn output_is_twice_the_landmark_count() {
    let set = hand(&[(0.3, 0.4), (0.5, 0.9), (0.2, 0.6)]);
    let features = FeatureVector::from_landmarks(&set).unwrap();
    assert_eq!(features.len(), 6);
  }

  #[test]
  fn per_axis_minimum_becomes_zero() {
    let set = hand(&[(0.35, 0.42), (0.51, 0.18), (0.27, 0.66), (0.8, 0.3)]);
    let features = FeatureVector::from_landmarks(&set).unwrap();
    let values = features.as_ref();

    let min_x = values.iter().step_by(2).copied().fold(f32::INFINITY, f32::min);
    let min_y = values
      .iter()
      .skip(1)
      .step_by(2)
      .copied()
      .fold(f32::INFINITY, f32::min);
    assert_eq!(min_x, 0.0);
    assert_eq!(min_y, 0.0);
  }

  #[test]
  fn keeps_x_then_y_interleaving() {
    let set = hand(&[(0.5, 0.25), (0.75, 0.5)]);
    let features = FeatureVector::from_landmarks(&set).unwrap();
    assert_eq!(features.as_ref(), &[0.0, 0.0, 0.25, 0.25]);
  }

  #[test]
  fn translated_hands_give_identical_features() {
    let a = hand(&[(0.1, 0.2), (0.3, 0.5), (0.25, 0.125)]);
    let b = hand(&[(0.6, 0.45), (0.8, 0.75), (0.75, 0.375)]);
    let fa = FeatureVector::from_landmarks(&a).unwrap();
    let fb = FeatureVector::from_landmarks(&b).unwrap();
    for (x, y) in fa.as_ref().iter().zip(fb.as_ref()) {
      assert!((x - y).abs() < 1e-6);
    }
  }

  #[test]
  fn empty_set_is_invalid_input() {
    let err = FeatureVector::from_landmarks(&LandmarkSet::default()).unwrap_err();
    assert_eq!(err, FeatureError::InvalidInput);
  }
}
