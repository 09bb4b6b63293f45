// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use mon64_core::MemSpace;
use mon64_debug::condition::parse_number;
use mon64_debug::Monitor;
use structopt::StructOpt;

use crate::app::{self, JamAction};

#[derive(StructOpt, Debug)]
#[structopt(name = "mon64")]
pub struct Opt {
    /// attach and autostart program image
    #[structopt(parse(from_os_str))]
    pub image: Option<PathBuf>,

    /// start in the text monitor reading commands from stdin
    #[structopt(long)]
    pub console: bool,
    /// set cpu jam handling
    #[structopt(
        long = "jamaction",
        default_value = "continue",
        parse(try_from_str = parse_jam_action)
    )]
    pub jam_action: JamAction,

    // -- Debug
    /// set breakpoint at this address
    #[structopt(long, parse(try_from_str = parse_address))]
    pub bp: Vec<u16>,
    /// enable the binary remote monitor
    #[structopt(long = "binarymonitor")]
    pub binary_monitor: bool,
    /// bind the binary remote monitor to the specified address
    #[structopt(
        long = "binarymonitor-address",
        default_value = "127.0.0.1:6502",
        parse(try_from_str = parse_socket_addr)
    )]
    pub binary_monitor_address: SocketAddr,

    // -- Logging
    /// set log level
    #[structopt(long = "loglevel", default_value = "info")]
    pub log_level: String,
    /// set log level for a target
    #[structopt(long = "log", parse(try_from_str = parse_key_val))]
    pub log_target_level: Vec<(String, String)>,
}

pub fn build_app_options(opt: &Opt) -> app::Options {
    app::Options {
        console: opt.console,
        binary_monitor: opt.binary_monitor,
        binary_monitor_address: opt.binary_monitor_address,
        jam_action: opt.jam_action,
    }
}

pub fn set_monitor_options(monitor: &mut Monitor, opt: &Opt) -> Result<(), String> {
    for bp in &opt.bp {
        monitor.checkpoints_mut().set_at(MemSpace::Computer, *bp)?;
    }
    Ok(())
}

fn parse_address(s: &str) -> Result<u16, Box<dyn Error>> {
    let digits = s.trim_start_matches("0x");
    parse_number(digits, 16).ok_or_else(|| Box::<dyn Error>::from(format!("invalid address {}", s)))
}

fn parse_jam_action(s: &str) -> Result<JamAction, Box<dyn Error>> {
    match s {
        "continue" => Ok(JamAction::Continue),
        "quit" => Ok(JamAction::Quit),
        "reset" => Ok(JamAction::Reset),
        _ => Err(Box::<dyn Error>::from("invalid jamaction".to_string())),
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), Box<dyn Error>> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_socket_addr(s: &str) -> Result<SocketAddr, Box<dyn Error>> {
    s.parse::<SocketAddr>()
        .map_err(|_| Box::<dyn Error>::from("invalid address".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options() {
        let opt = Opt::from_iter(&[
            "mon64",
            "--binarymonitor",
            "--bp",
            "c000",
            "--bp",
            "$0810",
            "--jamaction",
            "quit",
            "--log",
            "binmon=trace",
            "demo.prg",
        ]);
        assert_eq!(true, opt.binary_monitor);
        assert_eq!(vec![0xc000, 0x0810], opt.bp);
        assert_eq!(
            vec![("binmon".to_string(), "trace".to_string())],
            opt.log_target_level
        );
        assert_eq!(Some(PathBuf::from("demo.prg")), opt.image);
        assert_eq!(
            "127.0.0.1:6502".parse::<SocketAddr>().unwrap(),
            opt.binary_monitor_address
        );
        match opt.jam_action {
            JamAction::Quit => {}
            other => panic!("unexpected jam action {:?}", other),
        }
    }

    #[test]
    fn reject_invalid_values() {
        assert!(Opt::from_iter_safe(&["mon64", "--bp", "xyz"]).is_err());
        assert!(Opt::from_iter_safe(&["mon64", "--jamaction", "halt"]).is_err());
        assert!(Opt::from_iter_safe(&["mon64", "--log", "binmon"]).is_err());
    }

    #[test]
    fn breakpoints_are_installed() {
        let opt = Opt::from_iter(&["mon64", "--bp", "1000"]);
        let mut monitor = Monitor::new();
        set_monitor_options(&mut monitor, &opt).unwrap();
        let cp = monitor.checkpoints().find(1).unwrap();
        assert_eq!(0x1000, cp.start);
        assert_eq!(true, cp.stop);
    }
}
