// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A thin wrapper around `env_logger` giving every binary in this workspace
//! the same timestamped, level-colored line format. Library crates log
//! through the `log` facade directly; only entry points (test binaries,
//! CLI front-ends) call `init_logger()`.

use std::io::Write;

use chrono::Local;
use colored::Colorize;
use log::Level;

/// Installs a process-wide logger reading its level from `RUST_LOG`
/// (defaulting to `info`). Safe to call more than once; later calls are
/// no-ops, matching `env_logger`'s own idempotence.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let level = colored_level(record.level());
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(buf, "{timestamp} {level} {}: {}", record.target(), record.args())
        })
        .try_init();
}

fn colored_level(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "ERROR".red().bold(),
        Level::Warn => "WARN ".yellow().bold(),
        Level::Info => "INFO ".green(),
        Level::Debug => "DEBUG".blue(),
        Level::Trace => "TRACE".normal(),
    }
}
