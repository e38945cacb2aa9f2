// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/forest.rs - 决策树集成模型
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
use tracing::error;

use crate::model::{GestureModel, ModelCapability, ModelError};

/// 树节点：分裂节点按 `x[feature] <= threshold` 走左子树，叶节点保存各类别计数
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
  Split {
    feature: usize,
    threshold: f32,
    left: usize,
    right: usize,
  },
  Leaf {
    value: Vec<f32>,
  },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
  pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
  fn leaf(&self, features: &[f32]) -> &[f32] {
    let mut index = 0;
    loop {
      match &self.nodes[index] {
        TreeNode::Split {
          feature,
          threshold,
          left,
          right,
        } => {
          index = if features[*feature] <= *threshold {
            *left
          } else {
            *right
          };
        }
        TreeNode::Leaf { value } => return value,
      }
    }
  }

  // 子节点必须位于父节点之后，保证遍历一定终止
  fn validate(&self, tree_idx: usize, n_features: usize, n_labels: usize) -> Result<(), ModelError> {
    if self.nodes.is_empty() {
      return Err(ModelError::ModelInvalid(format!("第 {} 棵树没有节点", tree_idx)));
    }

    for (idx, node) in self.nodes.iter().enumerate() {
      match node {
        TreeNode::Split {
          feature,
          left,
          right,
          ..
        } => {
          if *feature >= n_features {
            return Err(ModelError::ModelInvalid(format!(
              "第 {} 棵树节点 {} 的特征索引 {} 超出输入维度 {}",
              tree_idx, idx, feature, n_features
            )));
          }
          for child in [*left, *right] {
            if child <= idx || child >= self.nodes.len() {
              return Err(ModelError::ModelInvalid(format!(
                "第 {} 棵树节点 {} 的子节点索引 {} 无效",
                tree_idx, idx, child
              )));
            }
          }
        }
        TreeNode::Leaf { value } => {
          if value.len() != n_labels {
            return Err(ModelError::ModelInvalid(format!(
              "第 {} 棵树叶节点 {} 长度 {} 与标签数 {} 不一致",
              tree_idx,
              idx,
              value.len(),
              n_labels
            )));
          }
        }
      }
    }
    Ok(())
  }
}

/// 决策树集成，概率为各树叶节点归一化分布的平均值
#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
  labels: Vec<String>,
  n_features: usize,
  trees: Vec<DecisionTree>,
}

impl ForestModel {
  pub fn new(
    labels: Vec<String>,
    n_features: usize,
    trees: Vec<DecisionTree>,
  ) -> Result<Self, ModelError> {
    let model = Self {
      labels,
      n_features,
      trees,
    };
    model.validate()?;
    Ok(model)
  }

  pub fn validate(&self) -> Result<(), ModelError> {
    if self.labels.is_empty() {
      return Err(ModelError::ModelInvalid("标签列表为空".to_string()));
    }
    if self.trees.is_empty() {
      return Err(ModelError::ModelInvalid("模型中没有决策树".to_string()));
    }
    for (idx, tree) in self.trees.iter().enumerate() {
      tree.validate(idx, self.n_features, self.labels.len()).inspect_err(|e| {
        error!("决策树校验失败: {}", e);
      })?;
    }
    Ok(())
  }
}

impl GestureModel for ForestModel {
  fn input_width(&self) -> usize {
    self.n_features
  }

  fn labels(&self) -> &[String] {
    &self.labels
  }

  fn capability(&self) -> ModelCapability {
    ModelCapability::Distribution
  }

  fn predict(&self, features: &[f32]) -> usize {
    self
      .predict_distribution(features)
      .and_then(|probs| {
        probs
          .iter()
          .enumerate()
          .max_by(|a, b| a.1.total_cmp(b.1))
          .map(|(i, _)| i)
      })
      .unwrap_or(0)
  }

  fn predict_distribution(&self, features: &[f32]) -> Option<Vec<f32>> {
    let mut probs = vec![0.0f32; self.labels.len()];
    for tree in &self.trees {
      let leaf = tree.leaf(features);
      let total: f32 = leaf.iter().sum();
      if total <= 0.0 {
        continue;
      }
      for (p, v) in probs.iter_mut().zip(leaf) {
        *p += v / total;
      }
    }

    let count = self.trees.len() as f32;
    probs.iter_mut().for_each(|p| *p /= count);
    Some(probs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stump(feature: usize, left: Vec<f32>, right: Vec<f32>) -> DecisionTree {
    DecisionTree {
      nodes: vec![
        TreeNode::Split {
          feature,
          threshold: 0.5,
          left: 1,
          right: 2,
        },
        TreeNode::Leaf { value: left },
        TreeNode::Leaf { value: right },
      ],
    }
  }

  fn labels() -> Vec<String> {
    vec!["A".to_string(), "B".to_string(), "C".to_string()]
  }

  #[test]
  fn threshold_is_inclusive_on_the_left() {
    let model = ForestModel::new(
      labels(),
      2,
      vec![stump(0, vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0])],
    )
    .unwrap();
    assert_eq!(model.predict(&[0.5, 0.0]), 0);
    assert_eq!(model.predict(&[0.51, 0.0]), 2);
  }

  #[test]
  fn distribution_sums_to_one() {
    let model = ForestModel::new(
      labels(),
      2,
      vec![
        stump(0, vec![3.0, 1.0, 0.0], vec![0.0, 0.0, 5.0]),
        stump(1, vec![0.0, 2.0, 2.0], vec![1.0, 1.0, 2.0]),
      ],
    )
    .unwrap();
    let probs = model.predict_distribution(&[0.1, 0.9]).unwrap();
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    assert_eq!(model.predict(&[0.1, 0.9]), 0);
  }

  #[test]
  fn rejects_backward_child_index() {
    let tree = DecisionTree {
      nodes: vec![
        TreeNode::Split {
          feature: 0,
          threshold: 0.5,
          left: 0,
          right: 1,
        },
        TreeNode::Leaf {
          value: vec![1.0, 0.0, 0.0],
        },
      ],
    };
    assert!(matches!(
      ForestModel::new(labels(), 2, vec![tree]),
      Err(ModelError::ModelInvalid(_))
    ));
  }

  #[test]
  fn rejects_leaf_with_wrong_length() {
    let tree = stump(0, vec![1.0, 0.0], vec![0.0, 1.0, 0.0]);
    assert!(ForestModel::new(labels(), 2, vec![tree]).is_err());
  }

  #[test]
  fn rejects_feature_outside_input() {
    let tree = stump(5, vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]);
    assert!(ForestModel::new(labels(), 2, vec![tree]).is_err());
  }
}
