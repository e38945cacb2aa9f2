// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/draw.rs - 手势识别结果可视化
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

use std::path::Path;
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
  draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
  draw_text_mut,
};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{error, info};

use crate::{
  hand::{HAND_CONNECTIONS, LandmarkSet},
  model::Classification,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 36.0;
const LABEL_POSITION: (i32, i32) = (10, 20);
const LABEL_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

// 保持进度条
const PROGRESS_POSITION: (i32, i32) = (10, 64);
const PROGRESS_SIZE: (u32, u32) = (200, 12);
const PROGRESS_COLOR: [u8; 3] = [0, 200, 255];

const LANDMARK_RADIUS: i32 = 3;
const LANDMARK_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const CONNECTION_COLOR: [u8; 3] = [255, 255, 255]; // 白色

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf"); // DejaVu Sans

/// 内置字体
pub fn default_font() -> Option<FontArc> {
  FontArc::try_from_slice(DEFAULT_FONT)
    .inspect_err(|e| error!("无法加载内置字体: {}", e))
    .ok()
}

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 绘制一帧所需的信息
pub struct Annotation<'a> {
  pub hands: &'a [LandmarkSet],
  pub classification: Option<&'a Classification>,
  /// 当前保持的标签与时长
  pub hold: Option<(&'a str, Duration)>,
  pub threshold: Duration,
}

impl Annotation<'_> {
  /// 有置信度时显示置信度，否则显示已保持时间
  pub fn label_text(&self) -> Option<String> {
    let classification = self.classification?;
    let text = match (classification.confidence, self.hold) {
      (Some(confidence), _) => format!("{} {:.2}", classification.label, confidence),
      (None, Some((label, elapsed))) if label == classification.label => {
        format!("{} {:.1}s", classification.label, elapsed.as_secs_f32())
      }
      (None, _) => classification.label.clone(),
    };
    Some(text)
  }

  /// 保持进度 0.0 - 1.0
  pub fn hold_ratio(&self) -> Option<f32> {
    let (_, elapsed) = self.hold?;
    if self.threshold.is_zero() {
      return Some(1.0);
    }
    Some((elapsed.as_secs_f32() / self.threshold.as_secs_f32()).clamp(0.0, 1.0))
  }
}

/// 可视化工具
///
/// 默认使用内置字体；`new(None)` 得到的实例只绘制关键点与进度条。
#[derive(Clone)]
pub struct Overlay {
  font: Option<FontArc>,
  font_scale: PxScale,
  label_color: Rgb<u8>,
}

impl Default for Overlay {
  fn default() -> Self {
    Self::new(default_font())
  }
}

impl Overlay {
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      label_color: Rgb(LABEL_COLOR),
    }
  }

  pub fn from_font_file(path: &Path) -> Result<Self, OverlayError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.display());
    Ok(Self::new(Some(font)))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn annotate(&self, image: &mut RgbImage, annotation: &Annotation) {
    for hand in annotation.hands {
      Self::draw_hand(image, hand);
    }

    if let (Some(font), Some(text)) = (&self.font, annotation.label_text()) {
      draw_text_mut(
        image,
        self.label_color,
        LABEL_POSITION.0,
        LABEL_POSITION.1,
        self.font_scale,
        font,
        &text,
      );
    }

    if let Some(ratio) = annotation.hold_ratio() {
      Self::draw_progress(image, ratio);
    }
  }

  fn draw_hand(image: &mut RgbImage, hand: &LandmarkSet) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let pixel = |i: usize| {
      let p = hand.points[i];
      (p.x * w, p.y * h)
    };

    for &(a, b) in HAND_CONNECTIONS.iter() {
      if a < hand.len() && b < hand.len() {
        draw_line_segment_mut(image, pixel(a), pixel(b), Rgb(CONNECTION_COLOR));
      }
    }

    for i in 0..hand.len() {
      let (x, y) = pixel(i);
      draw_filled_circle_mut(
        image,
        (x.round() as i32, y.round() as i32),
        LANDMARK_RADIUS,
        Rgb(LANDMARK_COLOR),
      );
    }
  }

  fn draw_progress(image: &mut RgbImage, ratio: f32) {
    let (x, y) = PROGRESS_POSITION;
    let (width, height) = PROGRESS_SIZE;
    if image.width() < x as u32 + width || image.height() < y as u32 + height {
      return;
    }

    let outline = Rect::at(x, y).of_size(width, height);
    draw_hollow_rect_mut(image, outline, Rgb(PROGRESS_COLOR));

    let filled = (width as f32 * ratio) as u32;
    if filled > 0 {
      draw_filled_rect_mut(image, Rect::at(x, y).of_size(filled, height), Rgb(PROGRESS_COLOR));
    }
  }
}
