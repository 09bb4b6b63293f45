// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::io;
use std::io::{Error, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use mon64_core::Machine;

use crate::checkpoint::Checkpoint;
use crate::monitor::Monitor;

use super::dispatcher;
use super::protocol::{BinaryCommand, Response, MAX_BODY_LENGTH, REQUEST_HEADER_LENGTH, STX};

// Design:
//   The server never blocks the emulator while waiting for a client. The listener and
//   the idle connection are polled; only once a request has started arriving are the
//   remaining bytes of that frame read with blocking calls. One client is served at a
//   time and further connections wait in the listen backlog until it disconnects.

/// Byte stream to a connected client.
pub trait Transport {
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
    /// Blocking read; `Ok(0)` means the peer closed the connection.
    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
    /// True when a read would not block, including at end of stream.
    fn data_available(&mut self) -> io::Result<bool>;
}

pub trait Acceptor {
    fn accept_pending(&mut self) -> io::Result<Option<Box<dyn Transport>>>;
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(target: "binmon", "Listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Acceptor for TcpAcceptor {
    fn accept_pending(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "binmon", "Connection from {}", addr);
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(Some(Box::new(TcpTransport { stream })))
            }
            Err(ref error) if error.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buffer)
    }

    fn data_available(&mut self) -> io::Result<bool> {
        let mut probe = [0u8; 1];
        self.stream.set_nonblocking(true)?;
        let result = self.stream.peek(&mut probe);
        self.stream.set_nonblocking(false)?;
        match result {
            Ok(_) => Ok(true),
            Err(ref error) if error.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(error) => Err(error),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerState {
    Listening,
    Connected,
    ProcessingCommand,
}

pub struct BinaryServer {
    // Dependencies
    acceptor: Box<dyn Acceptor>,
    // I/O
    connection: Option<Box<dyn Transport>>,
    // Runtime State
    state: ServerState,
}

impl BinaryServer {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let acceptor = TcpAcceptor::bind(addr)?;
        Ok(Self::new(Box::new(acceptor)))
    }

    pub fn new(acceptor: Box<dyn Acceptor>) -> Self {
        Self {
            acceptor,
            connection: None,
            state: ServerState::Listening,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Accept a waiting client and report whether a request is ready to be served.
    pub fn poll(&mut self) -> bool {
        if self.state == ServerState::Listening {
            match self.acceptor.accept_pending() {
                Ok(Some(transport)) => {
                    self.connection = Some(transport);
                    self.state = ServerState::Connected;
                }
                Ok(None) => {}
                Err(error) => warn!(target: "binmon", "Accept failed, error - {}", error),
            }
        }
        self.data_available()
    }

    /// Serve requests until none is immediately available or the monitor is to be left.
    pub fn process_pending(&mut self, monitor: &mut Monitor, machine: &mut dyn Machine) {
        while !monitor.is_exit_requested() && self.data_available() {
            let command = match self.read_command() {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(error) => {
                    info!(target: "binmon", "Connection closed, {}", error);
                    self.close();
                    break;
                }
            };
            self.state = ServerState::ProcessingCommand;
            let responses = dispatcher::process_command(monitor, machine, &command);
            for response in responses {
                self.send(&response);
            }
            if self.connection.is_some() {
                self.state = ServerState::Connected;
            }
        }
    }

    // -- Events

    pub fn notify_opened(&mut self, machine: &dyn Machine) {
        for event in dispatcher::opened_events(machine) {
            self.send(&event);
        }
    }

    pub fn notify_closed(&mut self, pc: u16) {
        self.send(&dispatcher::resumed_event(pc));
    }

    pub fn notify_jam(&mut self, pc: u16) {
        self.send(&dispatcher::jam_event(pc));
    }

    pub fn notify_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.send(&dispatcher::checkpoint_event(checkpoint));
    }

    // -- Connection

    fn data_available(&mut self) -> bool {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.data_available(),
            None => return false,
        };
        match result {
            Ok(available) => available,
            Err(error) => {
                info!(target: "binmon", "Connection closed, {}", error);
                self.close();
                false
            }
        }
    }

    fn send(&mut self, response: &Response) {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.send(&response.encode()),
            None => return,
        };
        if let Err(error) = result {
            warn!(target: "binmon", "Send failed, error - {}", error);
            self.close();
        }
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            info!(target: "binmon", "Client disconnected");
        }
        self.state = ServerState::Listening;
    }

    /// Read one request. Bytes before STX are dropped; returns `None` when no STX
    /// arrived before the input ran dry.
    fn read_command(&mut self) -> io::Result<Option<BinaryCommand>> {
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return Ok(None),
        };
        let mut byte = [0u8; 1];
        loop {
            read_exact(&mut **connection, &mut byte)?;
            if byte[0] == STX {
                break;
            }
            trace!(target: "binmon", "Skipping {:02x}", byte[0]);
            if !connection.data_available()? {
                return Ok(None);
            }
        }
        let mut header = [0u8; REQUEST_HEADER_LENGTH];
        read_exact(&mut **connection, &mut header)?;
        let (api_version, length, request_id, command_type) =
            BinaryCommand::parse_header(&header);
        if length > MAX_BODY_LENGTH {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("request body of {} bytes is too large", length),
            ));
        }
        let mut body = vec![0; length as usize];
        read_exact(&mut **connection, &mut body)?;
        Ok(Some(BinaryCommand {
            api_version,
            length,
            request_id,
            command_type,
            body,
        }))
    }
}

fn read_exact(transport: &mut dyn Transport, buffer: &mut [u8]) -> io::Result<()> {
    let mut offset = 0;
    while offset < buffer.len() {
        match transport.receive(&mut buffer[offset..]) {
            Ok(0) => return Err(Error::new(ErrorKind::UnexpectedEof, "end of stream")),
            Ok(count) => offset += count,
            Err(ref error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(())
}
