// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Logging setup, following the broker this gateway descends from:
//! `log4rs` driving a console appender plus an optional size-rolling
//! file appender, built from [`crate::config::Log`].

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::{Log as LogConfig, LogLevel};
use crate::error::{Error, ErrorKind};

const LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const ROLLER_PATTERN: &str = ".{}.gz";
const ROLLER_COUNT: u32 = 10;

const STDOUT_NAME: &str = "stdout";
const ROLLER_NAME: &str = "roller";

const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Off => LevelFilter::Off,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

fn logger_error(context: &str, err: impl std::fmt::Debug) -> Error {
    Error::from_string(ErrorKind::LoggerError, format!("{context}: {err:?}"))
}

/// Initialize the global `log4rs` logger from `log_conf`. Only the
/// appenders the config actually asks for are built: a bare
/// `console_log = false, log_file = None` config still installs a root
/// logger (at the configured level) with no appenders, rather than
/// erroring.
pub fn init_log(log_conf: &LogConfig) -> Result<(), Error> {
    let level = level_filter(log_conf.level);
    let mut builder = Config::builder();
    let mut appender_names = Vec::new();

    if log_conf.console_log {
        let stdout = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new("{d} {h({l})} - {m}{n}")))
            .build();
        builder = builder.appender(Appender::builder().build(STDOUT_NAME, Box::new(stdout)));
        appender_names.push(STDOUT_NAME);
    }

    if let Some(log_file) = &log_conf.log_file {
        let roller_pattern = format!("{log_file}{ROLLER_PATTERN}");
        let roller = FixedWindowRoller::builder()
            .build(&roller_pattern, ROLLER_COUNT)
            .map_err(|err| logger_error("failed to build roller pattern", err))?;
        let rolling_policy = Box::new(CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_SIZE)), Box::new(roller)));
        let appender = RollingFileAppender::builder()
            .build(log_file, rolling_policy)
            .map_err(|err| logger_error("failed to build rolling file appender", err))?;
        builder = builder.appender(Appender::builder().build(ROLLER_NAME, Box::new(appender)));
        appender_names.push(ROLLER_NAME);
    }

    let config = builder
        .build(Root::builder().appenders(appender_names).build(level))
        .map_err(|err| logger_error("failed to build log4rs config", err))?;

    log4rs::init_config(config).map_err(|err| logger_error("failed to init log4rs", err))?;
    Ok(())
}
