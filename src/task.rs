// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 叠加任务
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

use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{output::Render, plot::Overlay, results::ResultFrame};

pub trait Task<I, P, O>: Sized {
  type Error;
  fn run_task(self, input: I, overlay: P, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  D,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = ResultFrame>,
  P: Overlay<Output = D, Error = PE>,
  O: Render<ResultFrame, D, Error = RE>,
> Task<I, P, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut overlay: P, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功: {}{}", frame.path.display(), frame.verbose());
    let now = std::time::Instant::now();
    let result = overlay.overlay(&frame)?;
    let elapsed = now.elapsed();
    info!("叠加完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  D,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = ResultFrame>,
  P: Overlay<Output = D, Error = PE>,
  O: Render<ResultFrame, D, Error = RE>,
> Task<I, P, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut overlay: P, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut frame_index: usize = 0;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧: {}", frame_index, frame.verbose());
      let result = overlay.overlay(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("叠加完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", frame_index);
    Ok(())
  }
}
