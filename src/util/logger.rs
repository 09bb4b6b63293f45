// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::result::Result;
use std::str::FromStr;

use log::{Level, LevelFilter, Metadata, Record};

static CONFIG_FILE: &str = "logger.conf";

pub struct Logger {
    level: LevelFilter,
    targets: HashMap<String, LevelFilter>,
}

impl Logger {
    /// Build a logger from the global level and `target=level` overrides. Overrides
    /// from `logger.conf` in the working directory apply first when the file exists.
    pub fn build(level: &str, targets: &[(String, String)]) -> Result<Logger, String> {
        let mut logger = Logger::new(level)?;
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            logger.load_config(path)?;
        }
        for (target, level) in targets {
            logger.add_target(target.clone(), level)?;
        }
        Ok(logger)
    }

    pub fn new(level: &str) -> Result<Logger, String> {
        Ok(Logger {
            level: parse_level(level).map_err(|_| format!("invalid log level {}", level))?,
            targets: HashMap::new(),
        })
    }

    pub fn enable(logger: Logger) -> Result<(), String> {
        let max_level = logger.max_level();
        log::set_boxed_logger(Box::new(logger))
            .map(|()| log::set_max_level(max_level))
            .map_err(|_| "cannot initialize logging".to_string())
    }

    pub fn add_target(&mut self, target: String, level: &str) -> Result<(), String> {
        let level = parse_level(level)
            .map_err(|_| format!("invalid log level {} for target {}", level, &target))?;
        self.targets.insert(target, level);
        Ok(())
    }

    pub fn get_level(&self) -> LevelFilter {
        self.level
    }

    pub fn load_config(&mut self, path: &Path) -> Result<(), String> {
        let file = File::open(path)
            .map_err(|err| format!("failed to open file {}, {}", path.display(), err))?;
        let reader = BufReader::new(file);
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| format!("failed to read {}, {}", path.display(), err))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.find('=') {
                Some(equals) => {
                    let (target, level) = line.split_at(equals);
                    self.add_target(target.trim().to_string(), level[1..].trim())?;
                }
                None => return Err(format!("invalid logger config line {}", index + 1)),
            }
        }
        Ok(())
    }

    fn max_level(&self) -> LevelFilter {
        self.targets
            .values()
            .fold(self.level, |max, level| max.max(*level))
    }

    fn target_level(&self, target: &str) -> LevelFilter {
        self.targets.get(target).cloned().unwrap_or(self.level)
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.target_level(metadata.target())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error | Level::Warn => {
                    eprintln!("{} [{}] - {}", record.level(), record.target(), record.args())
                }
                _ => println!("{} [{}] - {}", record.level(), record.target(), record.args()),
            }
        }
    }

    fn flush(&self) {}
}

fn parse_level(level: &str) -> Result<LevelFilter, log::ParseLevelError> {
    LevelFilter::from_str(level)
}
