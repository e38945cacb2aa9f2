// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/centroid.rs - 最近质心模型
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

use serde::Deserialize;

use crate::model::{GestureModel, ModelCapability, ModelError};

#[derive(Debug, Clone, Deserialize)]
pub struct Centroid {
  pub label: String,
  pub center: Vec<f32>,
}

#[derive(Deserialize)]
struct CentroidModelFile {
  n_features: usize,
  centroids: Vec<Centroid>,
}

impl TryFrom<CentroidModelFile> for CentroidModel {
  type Error = ModelError;

  fn try_from(file: CentroidModelFile) -> Result<Self, Self::Error> {
    CentroidModel::new(file.n_features, file.centroids)
  }
}

/// 最近质心分类，只输出标签，不提供概率分布
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "CentroidModelFile")]
pub struct CentroidModel {
  n_features: usize,
  centroids: Vec<Centroid>,
  labels: Vec<String>,
}

impl CentroidModel {
  pub fn new(n_features: usize, centroids: Vec<Centroid>) -> Result<Self, ModelError> {
    let labels = centroids.iter().map(|c| c.label.clone()).collect();
    let model = Self {
      n_features,
      centroids,
      labels,
    };
    model.validate()?;
    Ok(model)
  }

  pub fn validate(&self) -> Result<(), ModelError> {
    if self.centroids.is_empty() {
      return Err(ModelError::ModelInvalid("质心列表为空".to_string()));
    }
    for centroid in &self.centroids {
      if centroid.center.len() != self.n_features {
        return Err(ModelError::ModelInvalid(format!(
          "质心 {} 的维度 {} 与输入维度 {} 不一致",
          centroid.label,
          centroid.center.len(),
          self.n_features
        )));
      }
    }
    Ok(())
  }
}

impl GestureModel for CentroidModel {
  fn input_width(&self) -> usize {
    self.n_features
  }

  fn labels(&self) -> &[String] {
    &self.labels
  }

  fn capability(&self) -> ModelCapability {
    ModelCapability::LabelOnly
  }

  fn predict(&self, features: &[f32]) -> usize {
    self
      .centroids
      .iter()
      .map(|c| {
        c.center
          .iter()
          .zip(features)
          .map(|(a, b)| (a - b) * (a - b))
          .sum::<f32>()
      })
      .enumerate()
      .min_by(|a, b| a.1.total_cmp(&b.1))
      .map(|(i, _)| i)
      .unwrap_or(0)
  }
}
