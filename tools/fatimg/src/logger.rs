use core::fmt::Display;
use std::io::{self, Write};
use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;

struct Inner {
    prefix: &'static str,
}

impl Inner {
    fn write_with_color(&mut self, out: &mut impl Write, color: Color, string: impl Display) {
        let string: &dyn Display = match color {
            Color::Default => &string,
            Color::Gray => &string.dimmed(),
            Color::BrightRed => &string.bright_red(),
            Color::BrightYellow => &string.bright_yellow(),
            Color::BrightBlue => &string.bright_blue(),
            Color::BrightCyan => &string.bright_cyan(),
            Color::BrightMagenta => &string.bright_magenta(),
        };
        // a closed stderr has nowhere to report to
        let _ = write!(out, "{string}");
    }
}

struct CliLogger {
    // serializes whole records on stderr
    inner: spin::Mutex<Inner>,
}

static LOGGER: CliLogger = CliLogger {
    inner: spin::Mutex::new(Inner { prefix: "fatimg: " }),
};

impl Log for CliLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut inner = self.inner.lock();
        let mut out = io::stderr().lock();
        let prefix = inner.prefix;
        inner.write_with_color(&mut out, Color::Default, prefix);
        let level = record.level();
        inner.write_with_color(
            &mut out,
            match level {
                Level::Error => Color::BrightRed,
                Level::Warn => Color::BrightYellow,
                Level::Info => Color::BrightBlue,
                Level::Debug => Color::BrightCyan,
                Level::Trace => Color::BrightMagenta,
            },
            format_args!("{level:5} "),
        );
        inner.write_with_color(&mut out, Color::Gray, format_args!("[{}] ", record.target()));
        inner.write_with_color(&mut out, Color::Default, record.args());
        inner.write_with_color(&mut out, Color::Default, "\n");
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_max_level(level);
    log::set_logger(&LOGGER)
}

/// Map the number of `-v` flags to a filter. Warnings are always shown.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

enum Color {
    Default,
    Gray,
    BrightRed,
    BrightYellow,
    BrightBlue,
    BrightCyan,
    BrightMagenta,
}
