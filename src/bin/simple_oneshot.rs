// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧辅助驾驶叠加
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_adas::{
  FromUrl,
  config::PlotConfig,
  input::InputWrapper,
  output::OutputWrapper,
  plot::Plotter,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 辅助驾驶叠加参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测结果来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 绘制配置文件（JSON）
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = match &args.config {
    Some(path) => PlotConfig::from_file(path)?,
    None => PlotConfig::default(),
  };

  let input = InputWrapper::from_url(&args.input)?;
  let plotter = Plotter::new(config)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input.into_iter(), plotter, output)?;

  Ok(())
}
