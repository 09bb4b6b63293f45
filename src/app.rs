// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use mon64_core::system::Sandbox;
use mon64_core::{Machine, MemSpace, ResetKind};
use mon64_debug::binary::BinaryServer;
use mon64_debug::Monitor;

// Design:
//   The machine runs in slices of instructions. Between slices the binary server is
//   polled so a client can interrupt a running program. A checkpoint stop, a cpu jam
//   or a pending request opens a monitor session; while it is open the machine only
//   advances through monitor commands. The session ends when exit or quit is
//   requested, or when nothing can drive it.

const STEPS_PER_SLICE: u16 = 1000;
const IDLE_WAIT: Duration = Duration::from_millis(1);

#[derive(Copy, Clone, Debug)]
pub enum JamAction {
    Continue,
    Quit,
    Reset,
}

pub struct Options {
    pub console: bool,
    pub binary_monitor: bool,
    pub binary_monitor_address: SocketAddr,
    pub jam_action: JamAction,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Running,
    Stopped,
}

#[derive(Debug)]
enum Reason {
    Startup,
    Checkpoint,
    Jam,
    Request,
}

pub struct App {
    // Dependencies
    options: Options,
    // Components
    machine: Sandbox,
    monitor: Monitor,
    server: Option<BinaryServer>,
    // Runtime State
    state: State,
}

impl App {
    pub fn build(machine: Sandbox, monitor: Monitor, options: Options) -> Result<App, String> {
        let server = if options.binary_monitor {
            let server = BinaryServer::bind(options.binary_monitor_address).map_err(|err| {
                format!(
                    "cannot bind binary monitor to {}, {}",
                    options.binary_monitor_address, err
                )
            })?;
            Some(server)
        } else {
            None
        };
        Ok(App {
            options,
            machine,
            monitor,
            server,
            state: State::Running,
        })
    }

    pub fn run(&mut self) -> Result<(), String> {
        info!(target: "app", "Running main loop");
        if self.options.console {
            self.enter_monitor(Reason::Startup)?;
        }
        while self.state == State::Running {
            let outcome = self.monitor.step(&mut self.machine, STEPS_PER_SLICE);
            self.flush_output()?;
            if outcome.jam {
                self.handle_cpu_jam()?;
            } else if outcome.stop {
                self.enter_monitor(Reason::Checkpoint)?;
            } else if self.poll_server() {
                self.enter_monitor(Reason::Request)?;
            }
        }
        info!(target: "app", "State {:?}", self.state);
        Ok(())
    }

    fn handle_cpu_jam(&mut self) -> Result<(), String> {
        let pc = self.get_pc();
        match self.options.jam_action {
            JamAction::Continue if self.has_monitor_interface() => {
                self.enter_monitor(Reason::Jam)?;
            }
            JamAction::Continue | JamAction::Quit => {
                warn!(target: "app", "CPU JAM detected at 0x{:x}", pc);
                self.set_state(State::Stopped);
            }
            JamAction::Reset => {
                warn!(target: "app", "CPU JAM detected at 0x{:x}, resetting", pc);
                self.machine.reset(ResetKind::Hard);
            }
        }
        Ok(())
    }

    // -- Monitor

    fn enter_monitor(&mut self, reason: Reason) -> Result<(), String> {
        info!(target: "app", "Entering monitor at 0x{:04x}, {:?}", self.get_pc(), reason);
        self.monitor.enter();
        let last_stop = self.monitor.checkpoints_mut().take_last_stop();
        let pc = self.get_pc();
        let jammed = self.machine.is_cpu_jam();
        let monitor = &self.monitor;
        if let Some(server) = self.server.as_mut() {
            if let Some(cp) = last_stop.and_then(|id| monitor.checkpoints().find(id)) {
                server.notify_checkpoint(cp);
            }
            if jammed {
                server.notify_jam(pc);
            }
            server.notify_opened(&self.machine);
        }
        self.flush_output()?;
        while !self.monitor.is_exit_requested() {
            let connected = match self.server.as_mut() {
                Some(server) => {
                    server.poll();
                    server.is_connected()
                }
                None => false,
            };
            if connected {
                if let Some(server) = self.server.as_mut() {
                    server.process_pending(&mut self.monitor, &mut self.machine);
                }
                thread::sleep(IDLE_WAIT);
            } else if self.options.console {
                self.read_console_command()?;
            } else if self.server.is_some() {
                thread::sleep(IDLE_WAIT);
            } else {
                self.monitor.request_exit();
            }
            self.flush_output()?;
        }
        if self.monitor.is_quit_requested() {
            self.set_state(State::Stopped);
        }
        let pc = self.get_pc();
        if let Some(server) = self.server.as_mut() {
            server.notify_closed(pc);
        }
        info!(target: "app", "Leaving monitor at 0x{:04x}", pc);
        Ok(())
    }

    fn read_console_command(&mut self) -> Result<(), String> {
        print!("(C:${:04x}) ", self.get_pc());
        io::stdout().flush().map_err(|err| format!("{}", err))?;
        let mut line = String::new();
        let count = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| format!("{}", err))?;
        if count == 0 {
            self.monitor.request_quit();
            return Ok(());
        }
        if let Err(error) = self.monitor.execute_line(&mut self.machine, &line) {
            debug!(target: "app", "Command failed, {}", error);
        }
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), String> {
        let output = self.monitor.take_output();
        if !output.is_empty() {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.as_bytes())
                .and_then(|_| handle.flush())
                .map_err(|err| format!("{}", err))?;
        }
        Ok(())
    }

    fn poll_server(&mut self) -> bool {
        match self.server.as_mut() {
            Some(server) => server.poll(),
            None => false,
        }
    }

    // -- Helpers

    fn get_pc(&self) -> u16 {
        self.machine
            .interface(MemSpace::Computer)
            .map_or(0, |iface| iface.get_pc())
    }

    fn has_monitor_interface(&self) -> bool {
        self.options.console || self.server.is_some()
    }

    fn set_state(&mut self, new_state: State) {
        if self.state != new_state {
            info!(target: "app", "State {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(jam_action: JamAction) -> Options {
        Options {
            console: false,
            binary_monitor: false,
            binary_monitor_address: "127.0.0.1:0".parse().unwrap(),
            jam_action,
        }
    }

    #[test]
    fn jam_without_monitor_stops() {
        let mut machine = Sandbox::new(false);
        machine.load(&[0xe8, 0x02], 0x1000);
        machine.set_pc(0x1000);
        let mut app = App::build(machine, Monitor::new(), options(JamAction::Continue)).unwrap();
        app.run().unwrap();
        assert_eq!(State::Stopped, app.state);
        assert_eq!(
            Some(1),
            app.machine
                .interface(MemSpace::Computer)
                .and_then(|iface| iface.get_register(1))
        );
    }

    #[test]
    fn checkpoint_without_monitor_resumes() {
        let mut machine = Sandbox::new(false);
        machine.load(&[0xe8, 0xe8, 0x02], 0x1000);
        machine.set_pc(0x1000);
        let mut monitor = Monitor::new();
        monitor.checkpoints_mut().set_at(MemSpace::Computer, 0x1001).unwrap();
        let mut app = App::build(machine, monitor, options(JamAction::Quit)).unwrap();
        app.run().unwrap();
        assert_eq!(State::Stopped, app.state);
        assert_eq!(1, app.monitor.checkpoints().find(1).unwrap().hit_count);
        assert_eq!(0x1002, app.get_pc());
    }
}
