// 该文件是 Shouyu （手语） 项目的一部分。
// src/hand.rs - 手部关键点定义
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

/// MediaPipe 手部模型的关键点数量
pub const HAND_LANDMARK_COUNT: usize = 21;

/// MediaPipe 手部骨架连线（关键点索引对）
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
  // 拇指
  (0, 1),
  (1, 2),
  (2, 3),
  (3, 4),
  // 食指
  (0, 5),
  (5, 6),
  (6, 7),
  (7, 8),
  // 中指
  (9, 10),
  (10, 11),
  (11, 12),
  // 无名指
  (13, 14),
  (14, 15),
  (15, 16),
  // 小指
  (0, 17),
  (17, 18),
  (18, 19),
  (19, 20),
  // 手掌
  (5, 9),
  (9, 13),
  (13, 17),
];

/// 单个关键点，坐标为归一化图像坐标 (0..1)
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Landmark {
  pub x: f32,
  pub y: f32,
}

impl Landmark {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

/// 一只手的关键点集合，顺序与检测器输出一致
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
  pub points: Box<[Landmark]>,
}

impl LandmarkSet {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
    self.points.iter()
  }
}

impl From<Vec<Landmark>> for LandmarkSet {
  fn from(points: Vec<Landmark>) -> Self {
    Self {
      points: points.into_boxed_slice(),
    }
  }
}

impl FromIterator<(f32, f32)> for LandmarkSet {
  fn from_iter<I: IntoIterator<Item = (f32, f32)>>(iter: I) -> Self {
    iter
      .into_iter()
      .map(|(x, y)| Landmark::new(x, y))
      .collect::<Vec<_>>()
      .into()
  }
}
