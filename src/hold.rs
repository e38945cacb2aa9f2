// 该文件是 Shouyu （手语） 项目的一部分。
// src/hold.rs - 保持手势提交状态机
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

//! 同一标签连续保持达到阈值后提交一个字符。
//!
//! 任何一帧未检测到手都会立即回到 `Idle`，进行中的计时清零。
//! 这与原有行为一致，没有加入容错帧。

use std::time::{Duration, Instant};

use tracing::debug;

/// 默认保持阈值（秒）
pub const DEFAULT_HOLD_SECONDS: f64 = 3.0;

const SPACE_LABEL: &str = "space";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldState {
  Idle,
  Holding { label: String, started_at: Instant },
}

/// 提交到文本缓冲区的一个单位
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitUnit {
  Space,
  Label(String),
}

impl CommitUnit {
  /// 标签忽略大小写等于 "space" 时提交空格，否则原样提交
  pub fn from_label(label: &str) -> Self {
    if label.eq_ignore_ascii_case(SPACE_LABEL) {
      CommitUnit::Space
    } else {
      CommitUnit::Label(label.to_string())
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      CommitUnit::Space => " ",
      CommitUnit::Label(label) => label,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldEvent {
  /// 本帧没有手
  Idle,
  /// 新标签开始计时
  Started,
  /// 同一标签仍在保持，尚未达到阈值
  Holding { elapsed: Duration },
  /// 达到阈值，提交并回到 `Idle`
  Committed(CommitUnit),
}

#[derive(Debug, Clone)]
pub struct HoldMachine {
  state: HoldState,
  threshold: Duration,
}

impl Default for HoldMachine {
  fn default() -> Self {
    Self::new(Duration::from_secs_f64(DEFAULT_HOLD_SECONDS))
  }
}

impl HoldMachine {
  pub fn new(threshold: Duration) -> Self {
    Self {
      state: HoldState::Idle,
      threshold,
    }
  }

  pub fn threshold(&self) -> Duration {
    self.threshold
  }

  pub fn state(&self) -> &HoldState {
    &self.state
  }

  /// 每帧调用一次；`label` 为 `None` 表示本帧未检测到手
  pub fn observe(&mut self, label: Option<&str>, now: Instant) -> HoldEvent {
    let Some(label) = label else {
      if let HoldState::Holding { label, .. } = &self.state {
        debug!("未检测到手，放弃保持中的标签 {}", label);
      }
      self.state = HoldState::Idle;
      return HoldEvent::Idle;
    };

    match &self.state {
      HoldState::Holding {
        label: held,
        started_at,
      } if held == label => {
        let elapsed = now.saturating_duration_since(*started_at);
        if elapsed >= self.threshold {
          let unit = CommitUnit::from_label(label);
          self.state = HoldState::Idle;
          HoldEvent::Committed(unit)
        } else {
          HoldEvent::Holding { elapsed }
        }
      }
      _ => {
        debug!("开始保持标签 {}", label);
        self.state = HoldState::Holding {
          label: label.to_string(),
          started_at: now,
        };
        HoldEvent::Started
      }
    }
  }

  /// 当前保持的标签与已保持时长
  pub fn progress(&self, now: Instant) -> Option<(&str, Duration)> {
    match &self.state {
      HoldState::Idle => None,
      HoldState::Holding { label, started_at } => {
        Some((label.as_str(), now.saturating_duration_since(*started_at)))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const FRAME: Duration = Duration::from_millis(100);

  fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
  }

  /// 从 `from` 到 `to`（含）每 100ms 喂一帧，返回所有提交
  fn feed(
    machine: &mut HoldMachine,
    base: Instant,
    label: Option<&str>,
    from: Duration,
    to: Duration,
  ) -> Vec<CommitUnit> {
    let mut commits = Vec::new();
    let mut t = from;
    while t <= to {
      if let HoldEvent::Committed(unit) = machine.observe(label, base + t) {
        commits.push(unit);
      }
      t += FRAME;
    }
    commits
  }

  #[test]
  fn switching_before_threshold_never_commits() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    let commits = feed(&mut machine, base, Some("A"), ms(0), ms(2900));
    assert!(commits.is_empty());

    assert_eq!(machine.observe(Some("B"), base + ms(3000)), HoldEvent::Started);
    assert_eq!(
      machine.state(),
      &HoldState::Holding {
        label: "B".into(),
        started_at: base + ms(3000)
      }
    );
  }

  #[test]
  fn holding_three_seconds_commits_exactly_once() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    let commits = feed(&mut machine, base, Some("A"), ms(0), ms(3000));
    assert_eq!(commits, vec![CommitUnit::Label("A".into())]);
    assert_eq!(machine.state(), &HoldState::Idle);

    // 继续保持需要重新计时
    let commits = feed(&mut machine, base, Some("A"), ms(3100), ms(5900));
    assert!(commits.is_empty());
    let commits = feed(&mut machine, base, Some("A"), ms(6000), ms(6100));
    assert_eq!(commits, vec![CommitUnit::Label("A".into())]);
  }

  #[test]
  fn threshold_is_a_closed_lower_bound() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    machine.observe(Some("A"), base);
    assert!(matches!(
      machine.observe(Some("A"), base + ms(2999)),
      HoldEvent::Holding { .. }
    ));
    assert_eq!(
      machine.observe(Some("A"), base + ms(3000)),
      HoldEvent::Committed(CommitUnit::Label("A".into()))
    );
  }

  #[test]
  fn space_label_commits_a_literal_space() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    let commits = feed(&mut machine, base, Some("Space"), ms(0), ms(3000));
    assert_eq!(commits, vec![CommitUnit::Space]);
    assert_eq!(commits[0].as_str(), " ");
  }

  #[test]
  fn a_single_missed_frame_resets_the_hold() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    feed(&mut machine, base, Some("A"), ms(0), ms(2500));
    assert_eq!(machine.observe(None, base + ms(2600)), HoldEvent::Idle);
    assert_eq!(machine.progress(base + ms(2600)), None);

    assert_eq!(machine.observe(Some("A"), base + ms(2700)), HoldEvent::Started);
    assert_eq!(machine.progress(base + ms(2700)), Some(("A", ms(0))));
  }

  #[test]
  fn gaps_every_two_seconds_never_commit() {
    let base = Instant::now();
    let mut machine = HoldMachine::default();
    let mut commits = Vec::new();
    for window in 0..10u64 {
      let start = ms(window * 2000);
      commits.extend(feed(
        &mut machine,
        base,
        Some("A"),
        start,
        start + ms(1900),
      ));
      commits.extend(feed(
        &mut machine,
        base,
        None,
        start + ms(1950),
        start + ms(1950),
      ));
    }
    assert!(commits.is_empty());
  }

  #[test]
  fn custom_threshold_is_honoured() {
    let base = Instant::now();
    let mut machine = HoldMachine::new(ms(500));
    let commits = feed(&mut machine, base, Some("B"), ms(0), ms(500));
    assert_eq!(commits, vec![CommitUnit::Label("B".into())]);
  }
}
