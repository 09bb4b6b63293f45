// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::path::Path;

use mon64_core::{
    Machine, MemSpace, MonitorInterface, OpMask, ResetKind, ResourceValue, StepOutcome,
};

use crate::checkpoint::Checkpoint;
use crate::monitor::Monitor;

use super::codec::{Reader, Writer};
use super::protocol::{
    BinaryCommand, CheckpointInfo, CommandType, ErrorCode, Response, ResponseType, API_VERSION,
};

// Design:
//   Each handler parses its body through a Reader, so a short body fails with
//   CMD_INVALID_LENGTH before anything is changed. Handlers return the reply payload or
//   an error code; the reply uses the command type as its response type except for the
//   checkpoint and register replies. Commands that run the cpu append the events of the
//   monitor being entered again after the reply.

const RESOURCE_STRING: u8 = 0x00;
const RESOURCE_INT: u8 = 0x01;

const DISPLAY_MAIN_LENGTH: u32 = 17;
const DISPLAY_RESERVED_LENGTH: u32 = 18;
const DISPLAY_INFO_LENGTH: u32 = 4 + DISPLAY_MAIN_LENGTH + 4 + DISPLAY_RESERVED_LENGTH;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DisplayFormat {
    Indexed8,
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
}

impl DisplayFormat {
    fn from(value: u8) -> Option<DisplayFormat> {
        match value {
            0x00 => Some(DisplayFormat::Indexed8),
            0x01 => Some(DisplayFormat::Rgb24),
            0x02 => Some(DisplayFormat::Bgr24),
            0x03 => Some(DisplayFormat::Rgba32),
            0x04 => Some(DisplayFormat::Bgra32),
            _ => None,
        }
    }

    fn depth(self) -> u8 {
        match self {
            DisplayFormat::Indexed8 => 8,
            DisplayFormat::Rgb24 | DisplayFormat::Bgr24 => 24,
            DisplayFormat::Rgba32 | DisplayFormat::Bgra32 => 32,
        }
    }

    fn encode_pixel(self, buffer: &mut Vec<u8>, index: u8, palette: &[u32]) {
        let color = palette.get(index as usize).cloned().unwrap_or(0);
        let red = (color >> 16) as u8;
        let green = (color >> 8) as u8;
        let blue = color as u8;
        match self {
            DisplayFormat::Indexed8 => buffer.push(index),
            DisplayFormat::Rgb24 => buffer.extend_from_slice(&[red, green, blue]),
            DisplayFormat::Bgr24 => buffer.extend_from_slice(&[blue, green, red]),
            DisplayFormat::Rgba32 => buffer.extend_from_slice(&[red, green, blue, 0xff]),
            DisplayFormat::Bgra32 => buffer.extend_from_slice(&[blue, green, red, 0xff]),
        }
    }
}

/// Execute one framed request and produce every response it causes, in send order.
pub fn process_command(
    monitor: &mut Monitor,
    machine: &mut dyn Machine,
    command: &BinaryCommand,
) -> Vec<Response> {
    let request_id = command.request_id;
    if command.api_version != API_VERSION {
        warn!(
            target: "binmon",
            "Unsupported api version {:02x} in request {}", command.api_version, request_id
        );
        return vec![Response::error(ErrorCode::CmdInvalidApiVersion, request_id)];
    }
    let command_type = match CommandType::from(command.command_type) {
        Ok(command_type) => command_type,
        Err(error) => {
            warn!(target: "binmon", "{}", error);
            return vec![Response::error(ErrorCode::CmdInvalidType, request_id)];
        }
    };
    debug!(target: "binmon", "Processing {:?} request {}", command_type, request_id);
    let mut reader = Reader::new(&command.body);
    let mut events = Vec::new();
    let result = match command_type {
        // Memory
        CommandType::MemGet => mem_get(machine, &mut reader),
        CommandType::MemSet => mem_set(machine, &mut reader),
        // Checkpoints
        CommandType::CheckpointGet => checkpoint_get(monitor, &mut reader),
        CommandType::CheckpointSet => checkpoint_set(monitor, &mut reader),
        CommandType::CheckpointDelete => checkpoint_delete(monitor, &mut reader),
        CommandType::CheckpointList => return checkpoint_list(monitor, request_id),
        CommandType::CheckpointToggle => checkpoint_toggle(monitor, &mut reader),
        CommandType::ConditionSet => condition_set(monitor, machine, &mut reader),
        // Registers
        CommandType::RegistersGet => registers_get(&*machine, &mut reader),
        CommandType::RegistersSet => registers_set(machine, &mut reader),
        // Snapshots
        CommandType::Dump => dump(&*machine, &mut reader),
        CommandType::Undump => undump(machine, &mut reader),
        // Resources
        CommandType::ResourceGet => resource_get(&*machine, &mut reader),
        CommandType::ResourceSet => resource_set(machine, &mut reader),
        // Execution
        CommandType::AdvanceInstructions => advance(monitor, machine, &mut reader, &mut events),
        CommandType::KeyboardFeed => keyboard_feed(machine, &mut reader),
        CommandType::ExecuteUntilReturn => {
            let outcome = monitor.execute_until_return(machine);
            events = stepped_events(monitor, &*machine, outcome);
            Ok(Vec::new())
        }
        // Info
        CommandType::Ping => Ok(Vec::new()),
        CommandType::BanksAvailable => banks_available(&*machine),
        CommandType::RegistersAvailable => registers_available(&*machine, &mut reader),
        CommandType::DisplayGet => display_get(&*machine, &mut reader),
        // Control
        CommandType::Exit => {
            monitor.request_exit();
            Ok(Vec::new())
        }
        CommandType::Quit => {
            monitor.request_quit();
            Ok(Vec::new())
        }
        CommandType::Reset => reset(machine, &mut reader),
        CommandType::Autostart => autostart(machine, &mut reader),
    };
    let mut responses = match result {
        Ok(body) => vec![Response::new(response_type(command_type), request_id, body)],
        Err(error) => {
            debug!(
                target: "binmon",
                "Request {} {:?} failed: {}", request_id, command_type, error
            );
            vec![Response::error(error, request_id)]
        }
    };
    responses.extend(events);
    responses
}

fn response_type(command_type: CommandType) -> u8 {
    match command_type {
        CommandType::CheckpointGet | CommandType::CheckpointSet => {
            ResponseType::CheckpointInfo as u8
        }
        CommandType::RegistersGet | CommandType::RegistersSet => ResponseType::RegisterInfo as u8,
        _ => command_type as u8,
    }
}

// -- Events

/// Register values of a memspace: u16 count, then (size 3, id, u16 value) per register.
pub fn register_info(iface: &dyn MonitorInterface) -> Vec<u8> {
    let registers = iface
        .registers()
        .iter()
        .filter(|reg| !reg.is_flags)
        .collect::<Vec<_>>();
    let mut writer = Writer::with_capacity(2 + registers.len() * 4);
    writer.u16(registers.len() as u16);
    for reg in registers {
        writer
            .u8(3)
            .u8(reg.id)
            .u16(iface.get_register(reg.id).unwrap_or(0));
    }
    writer.into_inner()
}

/// Events sent when the monitor is entered.
pub fn opened_events(machine: &dyn Machine) -> Vec<Response> {
    let mut events = Vec::with_capacity(2);
    if let Some(iface) = machine.interface(MemSpace::Computer) {
        events.push(Response::event(
            ResponseType::RegisterInfo,
            register_info(iface),
        ));
    }
    events.push(pc_event(ResponseType::Stopped, computer_pc(machine)));
    events
}

pub fn checkpoint_event(checkpoint: &Checkpoint) -> Response {
    Response::event(
        ResponseType::CheckpointInfo,
        CheckpointInfo::from(checkpoint, true).encode(),
    )
}

pub fn resumed_event(pc: u16) -> Response {
    pc_event(ResponseType::Resumed, pc)
}

pub fn jam_event(pc: u16) -> Response {
    pc_event(ResponseType::Jam, pc)
}

fn pc_event(response_type: ResponseType, pc: u16) -> Response {
    let mut writer = Writer::with_capacity(2);
    writer.u16(pc);
    Response::event(response_type, writer.into_inner())
}

fn stepped_events(monitor: &mut Monitor, machine: &dyn Machine, outcome: StepOutcome) -> Vec<Response> {
    let mut events = Vec::new();
    if let Some(id) = monitor.checkpoints_mut().take_last_stop() {
        if let Some(cp) = monitor.checkpoints().find(id) {
            events.push(checkpoint_event(cp));
        }
    }
    if outcome.jam {
        events.push(jam_event(computer_pc(machine)));
    }
    events.extend(opened_events(machine));
    events
}

// -- Memory

fn read_memspace(reader: &mut Reader) -> Result<MemSpace, ErrorCode> {
    let value = reader.read_u8()?;
    MemSpace::from_wire(value).ok_or(ErrorCode::InvalidMemspace)
}

fn interface(machine: &dyn Machine, space: MemSpace) -> Result<&dyn MonitorInterface, ErrorCode> {
    machine.interface(space).ok_or(ErrorCode::InvalidMemspace)
}

fn interface_mut(
    machine: &mut dyn Machine,
    space: MemSpace,
) -> Result<&mut dyn MonitorInterface, ErrorCode> {
    machine.interface_mut(space).ok_or(ErrorCode::InvalidMemspace)
}

struct MemRange {
    side_effects: bool,
    start: u16,
    end: u16,
    space: MemSpace,
    bank: u16,
}

impl MemRange {
    fn read(reader: &mut Reader) -> Result<MemRange, ErrorCode> {
        let side_effects = reader.read_u8()? != 0;
        let start = reader.read_u16le()?;
        let end = reader.read_u16le()?;
        let space = reader.read_u8()?;
        let bank = reader.read_u16le()?;
        if start > end {
            return Err(ErrorCode::InvalidParameter);
        }
        let space = MemSpace::from_wire(space).ok_or(ErrorCode::InvalidMemspace)?;
        Ok(MemRange {
            side_effects,
            start,
            end,
            space,
            bank,
        })
    }

    fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

fn mem_get(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let range = MemRange::read(reader)?;
    let iface = interface_mut(machine, range.space)?;
    if !iface.is_valid_bank(range.bank) {
        return Err(ErrorCode::InvalidParameter);
    }
    let mut writer = Writer::with_capacity(2 + range.len());
    // A full 64K range wraps the length field to 0
    writer.u16(range.len() as u16);
    for address in range.start..=range.end {
        let value = if range.side_effects {
            iface.read(range.bank, address)
        } else {
            iface.peek(range.bank, address)
        };
        writer.u8(value);
    }
    Ok(writer.into_inner())
}

fn mem_set(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let range = MemRange::read(reader)?;
    let data = reader.read_bytes(range.len())?;
    let iface = interface_mut(machine, range.space)?;
    if !iface.is_valid_bank(range.bank) {
        return Err(ErrorCode::InvalidParameter);
    }
    for (address, value) in (range.start..=range.end).zip(data) {
        iface.write(range.bank, address, value);
    }
    Ok(Vec::new())
}

// -- Checkpoints

fn find_checkpoint(monitor: &Monitor, id: u32) -> Result<&Checkpoint, ErrorCode> {
    monitor
        .checkpoints()
        .find(id)
        .ok_or(ErrorCode::ObjectMissing)
}

fn checkpoint_get(monitor: &mut Monitor, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let id = reader.read_u32le()?;
    let cp = find_checkpoint(monitor, id)?;
    Ok(CheckpointInfo::from(cp, false).encode())
}

fn checkpoint_set(monitor: &mut Monitor, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let start = reader.read_u16le()?;
    let end = reader.read_u16le()?;
    let stop = reader.read_u8()? != 0;
    let enabled = reader.read_u8()? != 0;
    let ops = OpMask::from_bits(reader.read_u8()?);
    let temporary = reader.read_u8()? != 0;
    let space = if reader.remaining() > 0 {
        read_memspace(reader)?
    } else {
        MemSpace::Computer
    };
    if start > end || ops.is_empty() {
        return Err(ErrorCode::InvalidParameter);
    }
    let id = monitor
        .checkpoints_mut()
        .add(space, start, Some(end), stop, ops, temporary, enabled)
        .map_err(|error| {
            warn!(target: "binmon", "{}", error);
            ErrorCode::CmdFailure
        })?;
    if monitor.checkpoints_mut().take_exit_request() {
        monitor.request_exit();
    }
    let cp = find_checkpoint(monitor, id)?;
    Ok(CheckpointInfo::from(cp, false).encode())
}

fn checkpoint_delete(monitor: &mut Monitor, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let id = reader.read_u32le()?;
    monitor
        .checkpoints_mut()
        .delete(id)
        .map_err(|_| ErrorCode::ObjectMissing)?;
    Ok(Vec::new())
}

fn checkpoint_list(monitor: &Monitor, request_id: u32) -> Vec<Response> {
    let checkpoints = monitor.checkpoints().list();
    let mut responses = checkpoints
        .iter()
        .map(|cp| {
            Response::new(
                ResponseType::CheckpointInfo as u8,
                request_id,
                CheckpointInfo::from(cp, false).encode(),
            )
        })
        .collect::<Vec<_>>();
    let mut writer = Writer::with_capacity(4);
    writer.u32(checkpoints.len() as u32);
    responses.push(Response::new(
        CommandType::CheckpointList as u8,
        request_id,
        writer.into_inner(),
    ));
    responses
}

fn checkpoint_toggle(monitor: &mut Monitor, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let id = reader.read_u32le()?;
    let enabled = reader.read_u8()? != 0;
    find_checkpoint(monitor, id)?;
    monitor
        .checkpoints_mut()
        .switch_enabled(Some(id), enabled)
        .map_err(|_| ErrorCode::ObjectMissing)?;
    Ok(Vec::new())
}

fn condition_set(
    monitor: &mut Monitor,
    machine: &mut dyn Machine,
    reader: &mut Reader,
) -> Result<Vec<u8>, ErrorCode> {
    let id = reader.read_u32le()?;
    let text = reader.read_length_prefixed_string()?;
    find_checkpoint(monitor, id)?;
    let line = format!("cond {} if ( {} )", id, text);
    monitor
        .execute_line(machine, &line)
        .map_err(|_| ErrorCode::CmdFailure)?;
    Ok(Vec::new())
}

// -- Registers

fn registers_get(machine: &dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let space = read_memspace(reader)?;
    let iface = interface(machine, space)?;
    Ok(register_info(iface))
}

fn registers_set(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let space = read_memspace(reader)?;
    let count = reader.read_u16le()?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let size = reader.read_u8()?;
        if size < 3 {
            return Err(ErrorCode::CmdInvalidLength);
        }
        let id = reader.read_u8()?;
        let value = reader.read_u16le()?;
        reader.skip(size as usize - 3)?;
        items.push((id, value));
    }
    let iface = interface_mut(machine, space)?;
    for (id, _) in &items {
        let known = iface
            .registers()
            .iter()
            .any(|reg| reg.id == *id && !reg.is_flags);
        if !known {
            return Err(ErrorCode::ObjectMissing);
        }
    }
    for (id, value) in items {
        iface.set_register(id, value).map_err(|error| {
            warn!(target: "binmon", "{}", error);
            ErrorCode::CmdFailure
        })?;
    }
    Ok(register_info(iface))
}

// -- Snapshots

fn dump(machine: &dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let save_roms = reader.read_u8()? != 0;
    let save_disks = reader.read_u8()? != 0;
    let name = reader.read_length_prefixed_string()?;
    machine
        .write_snapshot(Path::new(&name), save_roms, save_disks)
        .map_err(|error| {
            warn!(target: "binmon", "{}", error);
            ErrorCode::CmdFailure
        })?;
    Ok(Vec::new())
}

fn undump(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let name = reader.read_length_prefixed_string()?;
    machine.read_snapshot(Path::new(&name)).map_err(|error| {
        warn!(target: "binmon", "{}", error);
        ErrorCode::CmdFailure
    })?;
    let mut writer = Writer::with_capacity(2);
    writer.u16(computer_pc(&*machine));
    Ok(writer.into_inner())
}

// -- Resources

fn resource_get(machine: &dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let len = reader.read_u8()? as usize;
    if len == 0 {
        return Err(ErrorCode::CmdInvalidLength);
    }
    let name = reader.read_string(len)?;
    let value = machine.resource(&name).ok_or(ErrorCode::ObjectMissing)?;
    let mut writer = Writer::new();
    match value {
        ResourceValue::Str(text) => {
            writer.u8(RESOURCE_STRING).string(&text);
        }
        ResourceValue::Int(value) => {
            writer.u8(RESOURCE_INT).u8(4).u32(value);
        }
    }
    Ok(writer.into_inner())
}

fn resource_set(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let value_type = reader.read_u8()?;
    let name = reader.read_length_prefixed_string()?;
    let value = match value_type {
        RESOURCE_STRING => ResourceValue::Str(reader.read_length_prefixed_string()?),
        RESOURCE_INT => {
            let value = match reader.read_u8()? {
                1 => reader.read_u8()? as u32,
                2 => reader.read_u16le()? as u32,
                4 => reader.read_u32le()?,
                _ => return Err(ErrorCode::CmdInvalidLength),
            };
            ResourceValue::Int(value)
        }
        _ => return Err(ErrorCode::InvalidParameter),
    };
    machine.set_resource(&name, value).map_err(|error| {
        warn!(target: "binmon", "{}", error);
        ErrorCode::CmdFailure
    })?;
    Ok(Vec::new())
}

// -- Execution

fn advance(
    monitor: &mut Monitor,
    machine: &mut dyn Machine,
    reader: &mut Reader,
    events: &mut Vec<Response>,
) -> Result<Vec<u8>, ErrorCode> {
    let step_over = reader.read_u8()? != 0;
    let count = reader.read_u16le()?;
    let outcome = if step_over {
        monitor.next(machine, count)
    } else {
        monitor.step(machine, count)
    };
    *events = stepped_events(monitor, &*machine, outcome);
    Ok(Vec::new())
}

fn keyboard_feed(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let text = reader.read_length_prefixed_string()?;
    machine.keyboard_feed(&text);
    Ok(Vec::new())
}

// -- Info

fn banks_available(machine: &dyn Machine) -> Result<Vec<u8>, ErrorCode> {
    let iface = interface(machine, MemSpace::Computer)?;
    let banks = iface.banks();
    if banks.is_empty() {
        return Err(ErrorCode::CmdFailure);
    }
    let mut writer = Writer::new();
    writer.u16(banks.len() as u16);
    for bank in banks {
        writer
            .u8(bank.name.len() as u8 + 3)
            .u16(bank.id)
            .string(bank.name);
    }
    Ok(writer.into_inner())
}

fn registers_available(machine: &dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let space = read_memspace(reader)?;
    let iface = interface(machine, space)?;
    let registers = iface
        .registers()
        .iter()
        .filter(|reg| !reg.is_flags)
        .collect::<Vec<_>>();
    let mut writer = Writer::new();
    writer.u16(registers.len() as u16);
    for reg in registers {
        writer
            .u8(reg.name.len() as u8 + 3)
            .u8(reg.id)
            .u8(reg.bits)
            .string(reg.name);
    }
    Ok(writer.into_inner())
}

fn display_get(machine: &dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let use_vic = reader.read_u8()? != 0;
    let format = DisplayFormat::from(reader.read_u8()?).ok_or(ErrorCode::InvalidParameter)?;
    let screen = machine.screenshot(use_vic).map_err(|error| {
        warn!(target: "binmon", "{}", error);
        ErrorCode::CmdFailure
    })?;
    let depth = format.depth();
    let buffer_len =
        screen.debug_width as u32 * screen.debug_height as u32 * depth as u32 / 8;
    let mut writer = Writer::with_capacity(4 + DISPLAY_INFO_LENGTH as usize + buffer_len as usize);
    writer
        .u32(DISPLAY_INFO_LENGTH)
        .u32(DISPLAY_MAIN_LENGTH)
        .u32(buffer_len)
        .u16(screen.debug_width)
        .u16(screen.debug_height)
        .u16(screen.offset_x)
        .u16(screen.offset_y)
        .u16(screen.inner_width)
        .u16(screen.inner_height)
        .u8(depth);
    // Reserved section holds a TGA header for the buffer
    let (tga_depth, descriptor) = match format {
        DisplayFormat::Indexed8 => (16, 0x20),
        DisplayFormat::Rgb24 | DisplayFormat::Bgr24 => (24, 0x20),
        DisplayFormat::Rgba32 | DisplayFormat::Bgra32 => (32, 0x28),
    };
    let tga_width = if tga_depth == 16 {
        screen.debug_width / 2
    } else {
        screen.debug_width
    };
    writer
        .u32(DISPLAY_RESERVED_LENGTH)
        .u8(0)
        .u8(0)
        .u8(2)
        .bytes(&[0; 5])
        .u16(0)
        .u16(screen.debug_height)
        .u16(tga_width)
        .u16(screen.debug_height)
        .u8(tga_depth)
        .u8(descriptor);
    let mut pixels = Vec::with_capacity(buffer_len as usize);
    for index in &screen.pixels {
        format.encode_pixel(&mut pixels, *index, &screen.palette);
    }
    pixels.resize(buffer_len as usize, 0);
    writer.bytes(&pixels);
    Ok(writer.into_inner())
}

// -- Control

fn reset(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let kind = ResetKind::from_wire(reader.read_u8()?).ok_or(ErrorCode::InvalidParameter)?;
    machine.reset(kind);
    Ok(Vec::new())
}

fn autostart(machine: &mut dyn Machine, reader: &mut Reader) -> Result<Vec<u8>, ErrorCode> {
    let run = reader.read_u8()? != 0;
    let file_index = reader.read_u16le()?;
    let name = reader.read_length_prefixed_string()?;
    machine
        .autostart(Path::new(&name), file_index, run)
        .map_err(|error| {
            warn!(target: "binmon", "{}", error);
            ErrorCode::CmdFailure
        })?;
    Ok(Vec::new())
}

fn computer_pc(machine: &dyn Machine) -> u16 {
    machine
        .interface(MemSpace::Computer)
        .map_or(0, |iface| iface.get_pc())
}
