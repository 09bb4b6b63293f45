// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#[macro_use]
extern crate log;

mod app;
mod cli;
mod util;

use std::process;

use anyhow::{anyhow, Context};
use mon64_core::system::Sandbox;
use mon64_core::{Machine, ResetKind};
use mon64_debug::Monitor;
use structopt::StructOpt;

use crate::app::App;
use crate::cli::Opt;
use crate::util::Logger;

static NAME: &str = "mon64";

fn main() {
    let opt = Opt::from_args();
    match run(&opt) {
        Ok(_) => process::exit(0),
        Err(err) => {
            println!("Error: {:#}", err);
            process::exit(1)
        }
    };
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    let logger = Logger::build(opt.log_level.as_str(), &opt.log_target_level)
        .map_err(|err| anyhow!(err))?;
    Logger::enable(logger).map_err(|err| anyhow!(err))?;
    info!("Starting {}", NAME);
    let mut machine = Sandbox::new(true);
    machine.reset(ResetKind::Hard);
    if let Some(image_path) = &opt.image {
        machine
            .autostart(image_path, 0, true)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("cannot autostart {}", image_path.display()))?;
    }
    let mut monitor = Monitor::new();
    cli::set_monitor_options(&mut monitor, opt).map_err(|err| anyhow!(err))?;
    let mut app =
        App::build(machine, monitor, cli::build_app_options(opt)).map_err(|err| anyhow!(err))?;
    app.run().map_err(|err| anyhow!(err))?;
    Ok(())
}
