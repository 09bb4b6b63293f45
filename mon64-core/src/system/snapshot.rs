// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::factory::MemSpace;

use super::cpu::Registers;
use super::memory::IO_SIZE;

const MAGIC: &[u8; 4] = b"M64S";
const VERSION: u8 = 1;
const RAM_SIZE: usize = 0x10000;

pub struct SpaceImage {
    pub space: MemSpace,
    pub regs: Registers,
    pub cycles: u64,
    pub ram: Vec<u8>,
    pub io: Option<Vec<u8>>,
}

pub struct Snapshot {
    pub roms: bool,
    pub spaces: Vec<SpaceImage>,
}

impl Snapshot {
    pub fn load(path: &Path) -> io::Result<Snapshot> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Snapshot::read(&mut reader)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()
    }

    pub fn read(reader: &mut dyn Read) -> io::Result<Snapshot> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::new(ErrorKind::InvalidData, "Invalid snapshot signature"));
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Unsupported snapshot version {}", version),
            ));
        }
        let roms = reader.read_u8()? != 0;
        let count = reader.read_u8()?;
        let mut spaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            spaces.push(Snapshot::read_space(reader)?);
        }
        Ok(Snapshot { roms, spaces })
    }

    pub fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u8(VERSION)?;
        writer.write_u8(self.roms as u8)?;
        writer.write_u8(self.spaces.len() as u8)?;
        for image in &self.spaces {
            writer.write_u8(image.space.to_wire())?;
            writer.write_u8(image.regs.a)?;
            writer.write_u8(image.regs.x)?;
            writer.write_u8(image.regs.y)?;
            writer.write_u8(image.regs.sp)?;
            writer.write_u8(image.regs.p)?;
            writer.write_u16::<LittleEndian>(image.regs.pc)?;
            writer.write_u64::<LittleEndian>(image.cycles)?;
            writer.write_all(&image.ram)?;
            match image.io {
                Some(ref io) => {
                    writer.write_u8(1)?;
                    writer.write_all(io)?;
                }
                None => writer.write_u8(0)?,
            }
        }
        Ok(())
    }

    fn read_space(reader: &mut dyn Read) -> io::Result<SpaceImage> {
        let wire = reader.read_u8()?;
        let space = MemSpace::from_wire(wire).ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, format!("Invalid memspace {}", wire))
        })?;
        let regs = Registers {
            a: reader.read_u8()?,
            x: reader.read_u8()?,
            y: reader.read_u8()?,
            sp: reader.read_u8()?,
            p: reader.read_u8()?,
            pc: reader.read_u16::<LittleEndian>()?,
        };
        let cycles = reader.read_u64::<LittleEndian>()?;
        let mut ram = vec![0; RAM_SIZE];
        reader.read_exact(&mut ram)?;
        let io = if reader.read_u8()? != 0 {
            let mut io = vec![0; IO_SIZE];
            reader.read_exact(&mut io)?;
            Some(io)
        } else {
            None
        };
        Ok(SpaceImage {
            space,
            regs,
            cycles,
            ram,
            io,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_rejects_bad_signature() {
        let mut reader = Cursor::new(b"XXXX\x01\x00\x00".to_vec());
        let result = Snapshot::read(&mut reader);
        assert_eq!(ErrorKind::InvalidData, result.err().unwrap().kind());
    }

    #[test]
    fn read_truncated_space() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&[VERSION, 0, 1, 0, 1, 2, 3]);
        let mut reader = Cursor::new(data);
        assert!(Snapshot::read(&mut reader).is_err());
    }

    #[test]
    fn write_then_read_preserves_registers() {
        let mut ram = vec![0; RAM_SIZE];
        ram[0x1000] = 0xea;
        let snapshot = Snapshot {
            roms: true,
            spaces: vec![SpaceImage {
                space: MemSpace::Disk8,
                regs: Registers { a: 1, x: 2, y: 3, sp: 0xf0, p: 0x24, pc: 0x1234 },
                cycles: 99,
                ram,
                io: None,
            }],
        };
        let mut buffer = Vec::new();
        snapshot.write(&mut buffer).unwrap();
        let restored = Snapshot::read(&mut Cursor::new(buffer)).unwrap();
        assert!(restored.roms);
        assert_eq!(MemSpace::Disk8, restored.spaces[0].space);
        assert_eq!(0x1234, restored.spaces[0].regs.pc);
        assert_eq!(0xea, restored.spaces[0].ram[0x1000]);
        assert!(restored.spaces[0].io.is_none());
    }
}
