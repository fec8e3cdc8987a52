// Formatting follows pretty_env_logger v0.4.0, on top of Builder::from_env()

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use env_logger::{
    fmt::{Color, Style, StyledValue},
    Builder, Env,
};
use log::Level;

/// Default filter for the given `-v` count and `-q` flag. `RUST_LOG` still wins.
pub const fn level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

/// Install the global logger. Module targets are only printed once debug output is enabled.
pub fn init(level: &str) {
    let env = Env::default().filter_or("RUST_LOG", level);
    let show_target = !matches!(level, "error" | "warn" | "info");

    Builder::from_env(env)
        .format(move |buf, record| {
            use std::io::Write;

            let mut style = buf.style();
            let level = colored_level(&mut style, record.level());
            let text = record.args().to_string();
            let mut lines = text.lines();
            let first = lines.next().unwrap_or_default();

            let indent = if show_target {
                let target = record.target();
                let width = max_target_width(target);

                let mut style = buf.style();
                let target = style.set_bold(true).value(Padded {
                    value: target,
                    width,
                });

                writeln!(buf, "{level} {target} > {first}")?;
                width + 9
            } else {
                writeln!(buf, "{level} > {first}")?;
                8
            };

            for line in lines {
                writeln!(buf, "{:indent$}{line}", "")?;
            }

            Ok(())
        })
        .init();
}

struct Padded<T> {
    value: T,
    width: usize,
}

impl<T: fmt::Display> fmt::Display for Padded<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{: <width$}", self.value, width = self.width)
    }
}

static MAX_MODULE_WIDTH: AtomicUsize = AtomicUsize::new(0);

fn max_target_width(target: &str) -> usize {
    MAX_MODULE_WIDTH
        .fetch_max(target.len(), Ordering::Relaxed)
        .max(target.len())
}

fn colored_level(style: &'_ mut Style, level: Level) -> StyledValue<'_, &'static str> {
    match level {
        Level::Trace => style.set_color(Color::Magenta).value("TRACE"),
        Level::Debug => style.set_color(Color::Blue).value("DEBUG"),
        Level::Info => style.set_color(Color::Green).value("INFO "),
        Level::Warn => style.set_color(Color::Yellow).value("WARN "),
        Level::Error => style.set_color(Color::Red).value("ERROR"),
    }
}
