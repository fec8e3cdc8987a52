use std::{ffi::OsString, process::ExitCode};

use clap::{error::ErrorKind, ArgAction, CommandFactory, Parser};

#[macro_use]
extern crate log;

mod explode;
mod grid;
mod image_util;
mod logger;
mod naming;

use explode::ExplodeArgs;

const EXIT_USAGE: u8 = 1;

/// Create a png for each frame in a sprite map
///
/// The new files are named using the scheme <prefix>-<row index>-<column index>.png
/// next to the sprite map. Empty frames are omitted. Rows and columns are counted starting with 0.
/// Set either --width or --columns and either --height or --rows to describe the grid.
/// Go style single dash flags (-width 32, -mirror-left) are accepted as well.
#[derive(Parser, Debug)]
#[command(version, verbatim_doc_comment)]
struct Cli {
    #[clap(flatten)]
    args: ExplodeArgs,

    /// Print more log output, repeat for even more.
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors.
    #[clap(short, long, action, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> ExitCode {
    ExitCode::from(run(std::env::args_os()))
}

/// Parse `args`, split the sprite map and return the process exit status.
fn run<I>(args: I) -> u8
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(go_style_flags(args)) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();

            return if err.use_stderr() { EXIT_USAGE } else { 0 };
        }
    };

    if let Err(err) = cli.args.grid_spec().validate() {
        let _ = Cli::command()
            .error(ErrorKind::MissingRequiredArgument, err)
            .print();
        return EXIT_USAGE;
    }

    logger::init(logger::level(cli.verbose, cli.quiet));
    info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if let Err(err) = explode::explode(&cli.args) {
        error!("{err}");
        return err.exit_code();
    }

    0
}

/// Rewrite single dash long flags (`-width`, `-mirror-left=true`) to their double dash form.
/// Everything after `--` is left alone.
fn go_style_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let cmd = Cli::command();
    let longs = cmd
        .get_arguments()
        .filter_map(clap::Arg::get_long)
        .chain(["help", "version"])
        .collect::<Vec<_>>();

    let mut raw = false;
    args.into_iter()
        .map(|arg| {
            if raw {
                return arg;
            }

            if arg == "--" {
                raw = true;
                return arg;
            }

            let Some(flag) = arg.to_str().and_then(|arg| arg.strip_prefix('-')) else {
                return arg;
            };

            let name = flag.split_once('=').map_or(flag, |(name, _)| name);
            if longs.contains(&name) {
                OsString::from(format!("--{flag}"))
            } else {
                arg
            }
        })
        .collect()
}
