// 该文件是 Shouyu （手语） 项目的一部分。
// src/model.rs - 手势分类模型
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
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, feature::FeatureVector};

mod centroid;
mod forest;
pub use self::centroid::{Centroid, CentroidModel};
pub use self::forest::{DecisionTree, ForestModel, TreeNode};

/// 模型能力标记：是否能给出概率分布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCapability {
  Distribution,
  LabelOnly,
}

pub trait GestureModel {
  /// 模型期望的特征向量长度
  fn input_width(&self) -> usize;
  fn labels(&self) -> &[String];
  fn capability(&self) -> ModelCapability;

  /// 返回标签索引
  fn predict(&self, features: &[f32]) -> usize;

  /// 返回与 `labels()` 对齐的概率分布，仅 `Distribution` 能力的模型实现
  fn predict_distribution(&self, _features: &[f32]) -> Option<Vec<f32>> {
    None
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型反序列化错误: {0}")]
  ModelParseError(#[from] serde_json::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ClassifyError {
  #[error("分类器未加载")]
  ClassifierUnavailable,
  #[error("特征维度不匹配: 模型期望 {expected}, 实际 {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
  #[error("模型输出的类别下标 {index} 超出标签数量 {labels}")]
  LabelOutOfRange { index: usize, labels: usize },
}

/// 持久化的模型文件，按 `kind` 字段区分
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelWrapper {
  Forest(ForestModel),
  Centroid(CentroidModel),
}

impl ModelWrapper {
  pub fn from_json(data: &[u8]) -> Result<Self, ModelError> {
    let model: ModelWrapper = serde_json::from_slice(data)?;
    model.validate()?;
    Ok(model)
  }

  pub fn validate(&self) -> Result<(), ModelError> {
    match self {
      ModelWrapper::Forest(model) => model.validate(),
      ModelWrapper::Centroid(model) => model.validate(),
    }
  }
}

impl GestureModel for ModelWrapper {
  fn input_width(&self) -> usize {
    match self {
      ModelWrapper::Forest(model) => model.input_width(),
      ModelWrapper::Centroid(model) => model.input_width(),
    }
  }

  fn labels(&self) -> &[String] {
    match self {
      ModelWrapper::Forest(model) => model.labels(),
      ModelWrapper::Centroid(model) => model.labels(),
    }
  }

  fn capability(&self) -> ModelCapability {
    match self {
      ModelWrapper::Forest(model) => model.capability(),
      ModelWrapper::Centroid(model) => model.capability(),
    }
  }

  fn predict(&self, features: &[f32]) -> usize {
    match self {
      ModelWrapper::Forest(model) => model.predict(features),
      ModelWrapper::Centroid(model) => model.predict(features),
    }
  }

  fn predict_distribution(&self, features: &[f32]) -> Option<Vec<f32>> {
    match self {
      ModelWrapper::Forest(model) => model.predict_distribution(features),
      ModelWrapper::Centroid(model) => model.predict_distribution(features),
    }
  }
}

impl From<ForestModel> for ModelWrapper {
  fn from(model: ForestModel) -> Self {
    ModelWrapper::Forest(model)
  }
}

impl From<CentroidModel> for ModelWrapper {
  fn from(model: CentroidModel) -> Self {
    ModelWrapper::Centroid(model)
  }
}

pub struct GestureModelBuilder {
  model_path: String,
}

impl FromUrlWithScheme for GestureModelBuilder {
  const SCHEME: &'static str = "model";
}

impl FromUrl for GestureModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(GestureModelBuilder {
      model_path: url.path().to_string(),
    })
  }
}

impl GestureModelBuilder {
  pub fn build(self) -> Result<GestureClassifier, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!("模型文件大小: {:.2} KB", model_data.len() as f64 / 1024.0);

    let model = ModelWrapper::from_json(&model_data)?;
    info!(
      "模型加载完成: 输入维度 {}, 标签数 {}, 能力 {:?}",
      model.input_width(),
      model.labels().len(),
      model.capability()
    );
    Ok(GestureClassifier::new(model))
  }
}

/// 单帧分类结果；仅输出标签的模型没有置信度
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub label: String,
  pub confidence: Option<f32>,
}

/// 分类器适配层，加载后不可变，可在多个视频流之间共享
#[derive(Debug, Default)]
pub struct GestureClassifier {
  model: Option<ModelWrapper>,
}

impl GestureClassifier {
  pub fn new(model: impl Into<ModelWrapper>) -> Self {
    Self {
      model: Some(model.into()),
    }
  }

  /// 未加载模型的分类器，所有调用都返回 `ClassifierUnavailable`
  pub fn unloaded() -> Self {
    Self::default()
  }

  pub fn is_loaded(&self) -> bool {
    self.model.is_some()
  }

  pub fn capability(&self) -> Option<ModelCapability> {
    self.model.as_ref().map(|m| m.capability())
  }

  pub fn input_width(&self) -> Result<usize, ClassifyError> {
    self
      .model
      .as_ref()
      .map(|m| m.input_width())
      .ok_or(ClassifyError::ClassifierUnavailable)
  }

  /// 在开始处理前校验检测器给出的特征长度
  pub fn ensure_input_width(&self, actual: usize) -> Result<(), ClassifyError> {
    let expected = self.input_width()?;
    if expected != actual {
      return Err(ClassifyError::DimensionMismatch { expected, actual });
    }
    Ok(())
  }

  pub fn classify(&self, features: &FeatureVector) -> Result<Classification, ClassifyError> {
    let model = self
      .model
      .as_ref()
      .ok_or(ClassifyError::ClassifierUnavailable)?;

    let values = features.as_ref();
    if values.len() != model.input_width() {
      return Err(ClassifyError::DimensionMismatch {
        expected: model.input_width(),
        actual: values.len(),
      });
    }

    let labels = model.labels();
    let distribution = match model.capability() {
      ModelCapability::Distribution => model.predict_distribution(values),
      ModelCapability::LabelOnly => None,
    };

    let (index, confidence) = match distribution {
      Some(probs) => {
        let (index, max) = probs
          .iter()
          .copied()
          .enumerate()
          .fold((0usize, f32::MIN), |best, (i, p)| {
            if p > best.1 { (i, p) } else { best }
          });
        (index, Some(max.clamp(0.0, 1.0)))
      }
      None => (model.predict(values), None),
    };

    let label = label_at(labels, index)?;
    debug!("分类结果: {} {:?}", label, confidence);
    Ok(Classification { label, confidence })
  }
}

/// 模型加载时已校验标签数量，越界说明模型实现有误
fn label_at(labels: &[String], index: usize) -> Result<String, ClassifyError> {
  labels
    .get(index)
    .cloned()
    .ok_or(ClassifyError::LabelOutOfRange {
      index,
      labels: labels.len(),
    })
}
