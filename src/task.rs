// 该文件是 Shouyu （手语） 项目的一部分。
// src/task.rs - 帧循环
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

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use image::imageops::flip_horizontal_in_place;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detector::{DetectorBuilder, DetectorError, DetectorWrapper, HandDetector},
  feature::{FeatureError, FeatureVector},
  hold::{HoldEvent, HoldMachine, HoldState},
  input::{CaptureError, Frame},
  model::{Classification, ClassifyError, GestureClassifier},
  output::{
    Delivery, Render,
    draw::{Annotation, Overlay},
  },
  text::TextBuffer,
};

#[derive(Error, Debug)]
pub enum FrameLoopError {
  #[error("特征错误: {0}")]
  Feature(#[from] FeatureError),
  #[error("分类错误: {0}")]
  Classify(#[from] ClassifyError),
  #[error("检测错误: {0}")]
  Detector(#[from] DetectorError),
  #[error("采集错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("输出错误: {0}")]
  Output(String),
}

/// 帧循环正常结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
  /// 采集源没有更多帧
  CaptureEnded,
  /// 消费端已断开
  ConsumerClosed,
}

/// 单帧处理结果
#[derive(Debug)]
pub struct StepOutput {
  /// 镜像并标注后的图像
  pub image: RgbImage,
  pub index: u64,
  pub hands: usize,
  pub classification: Option<Classification>,
  pub event: HoldEvent,
}

/// 每个视频流一个实例，独占自己的检测器与保持状态
pub struct FrameLoop<D: HandDetector> {
  detector: D,
  classifier: Arc<GestureClassifier>,
  hold: HoldMachine,
  text: Arc<TextBuffer>,
  overlay: Arc<Overlay>,
  mirror: bool,
}

impl<D: HandDetector> FrameLoop<D> {
  /// 检测器给出的特征长度与模型不一致时直接失败，不产生任何帧
  pub fn new(
    detector: D,
    classifier: Arc<GestureClassifier>,
    text: Arc<TextBuffer>,
  ) -> Result<Self, FrameLoopError> {
    classifier.ensure_input_width(detector.landmark_count() * 2)?;
    Ok(Self {
      detector,
      classifier,
      hold: HoldMachine::default(),
      text,
      overlay: Arc::new(Overlay::default()),
      mirror: true,
    })
  }

  pub fn with_hold_threshold(mut self, threshold: Duration) -> Self {
    self.hold = HoldMachine::new(threshold);
    self
  }

  pub fn with_overlay(mut self, overlay: Arc<Overlay>) -> Self {
    self.overlay = overlay;
    self
  }

  pub fn with_mirror(mut self, mirror: bool) -> Self {
    self.mirror = mirror;
    self
  }

  pub fn hold_state(&self) -> &HoldState {
    self.hold.state()
  }

  /// 处理一帧：镜像、检测、归一化、分类、保持判定、标注
  ///
  /// 只有第一只手参与分类与计时，其余的手只绘制。
  pub fn step(&mut self, frame: Frame) -> Result<StepOutput, FrameLoopError> {
    let Frame {
      mut image,
      index,
      captured_at,
    } = frame;

    if self.mirror {
      flip_horizontal_in_place(&mut image);
    }

    let hands = self.detector.detect(&image)?;
    let classification = match hands.first() {
      Some(hand) => {
        let features = FeatureVector::from_landmarks(hand)?;
        Some(self.classifier.classify(&features)?)
      }
      None => None,
    };

    let event = self.hold.observe(
      classification.as_ref().map(|c| c.label.as_str()),
      captured_at,
    );
    if let HoldEvent::Committed(unit) = &event {
      self.text.commit(unit);
    }

    let annotation = Annotation {
      hands: &hands,
      classification: classification.as_ref(),
      hold: self.hold.progress(captured_at),
      threshold: self.hold.threshold(),
    };
    self.overlay.annotate(&mut image, &annotation);

    debug!(
      "第 {} 帧: {} 只手, 分类 {:?}, {:?}",
      index,
      hands.len(),
      classification.as_ref().map(|c| c.label.as_str()),
      event
    );

    Ok(StepOutput {
      image,
      index,
      hands: hands.len(),
      classification,
      event,
    })
  }

  /// 循环到采集结束或消费端关闭
  ///
  /// 采集故障、检测或分类错误会终止本次循环并返回错误。
  pub fn run<C, R>(&mut self, capture: C, output: &mut R) -> Result<LoopExit, FrameLoopError>
  where
    C: IntoIterator<Item = Result<Frame, CaptureError>>,
    R: Render,
    R::Error: std::fmt::Display,
  {
    info!("开始帧循环...");
    let started = Instant::now();
    let mut frames = capture.into_iter();
    let mut processed: u64 = 0;

    let exit = loop {
      if output.is_closed() {
        break LoopExit::ConsumerClosed;
      }

      let Some(frame) = frames.next() else {
        break LoopExit::CaptureEnded;
      };

      let step = match frame.map_err(FrameLoopError::from).and_then(|f| self.step(f)) {
        Ok(step) => step,
        Err(e) => {
          warn!("帧循环在第 {} 帧后终止: {}", processed, e);
          return Err(e);
        }
      };

      let delivery = output
        .render_frame(&step.image)
        .map_err(|e| FrameLoopError::Output(e.to_string()))?;
      processed += 1;
      if delivery == Delivery::Closed {
        break LoopExit::ConsumerClosed;
      }
    };

    info!(
      "帧循环结束: {:?}, 共 {} 帧, 耗时 {:.2?}",
      exit,
      processed,
      started.elapsed()
    );
    Ok(exit)
  }
}

impl FrameLoop<DetectorWrapper> {
  /// 先校验维度再启动检测器，维度不一致时不会产生检测进程
  pub fn from_builder(
    builder: &DetectorBuilder,
    classifier: Arc<GestureClassifier>,
    text: Arc<TextBuffer>,
  ) -> Result<Self, FrameLoopError> {
    classifier.ensure_input_width(builder.landmark_count() * 2)?;
    FrameLoop::new(builder.build()?, classifier, text)
  }
}
