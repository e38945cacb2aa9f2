// 该文件是 Shouyu （手语） 项目的一部分。
// src/text.rs - 共享文本缓冲区
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

use parking_lot::Mutex;
use tracing::info;

use crate::hold::CommitUnit;

/// 进程生命周期内的文本缓冲区
///
/// 所有读写都经过同一把锁，帧循环的提交与 HTTP 请求之间线性化。
#[derive(Debug, Default)]
pub struct TextBuffer {
  text: Mutex<String>,
}

impl TextBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn read(&self) -> String {
    self.text.lock().clone()
  }

  pub fn clear(&self) {
    self.text.lock().clear();
  }

  /// 删除最后一个字符，空缓冲区时不做任何事
  pub fn backspace(&self) -> Option<char> {
    self.text.lock().pop()
  }

  pub fn commit(&self, unit: &CommitUnit) {
    let mut text = self.text.lock();
    text.push_str(unit.as_str());
    info!("提交 {:?}，当前文本长度 {}", unit.as_str(), text.chars().count());
  }

  pub fn len(&self) -> usize {
    self.text.lock().chars().count()
  }

  pub fn is_empty(&self) -> bool {
    self.text.lock().is_empty()
  }
}
