use anyhow::Result;
use bpaf::Bpaf;
use softmock::{rewrite, sync};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version, fallback_to_usage)]
/// Soft mocks for Rust: instrument source trees so any function can be
/// replaced at run time
enum Cmd {
    /// Instrument a single source file
    #[bpaf(command)]
    Rewrite {
        /// Write the result back (a .bak copy of the original is kept)
        #[bpaf(long)]
        in_place: bool,

        /// Tree root used for the excluded-module check
        #[bpaf(long, argument("DIR"))]
        root: Option<PathBuf>,

        /// File to instrument
        #[bpaf(positional("FILE"))]
        file: PathBuf,
    },

    /// Mirror a source tree into an instrumented copy
    #[bpaf(command)]
    Sync {
        /// Source tree root
        #[bpaf(positional("FROM"))]
        from: PathBuf,

        /// Destination root
        #[bpaf(positional("TO"))]
        to: PathBuf,
    },
}

fn main() -> Result<()> {
    use bpaf::Args;

    let cmd = match cmd().run_inner(Args::current_args()) {
        Ok(cmd) => cmd,
        Err(bpaf::ParseFailure::Stdout(msg, _)) => {
            print!("{}", msg);
            std::process::exit(0);
        }
        Err(bpaf::ParseFailure::Completion(c)) => {
            print!("{}", c);
            std::process::exit(0);
        }
        Err(bpaf::ParseFailure::Stderr(_)) => {
            // Show help on any parse error
            if let Err(bpaf::ParseFailure::Stdout(help, _)) =
                cmd().run_inner(Args::from(&["--help"]))
            {
                print!("{}", help);
            }
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cmd {
        Cmd::Rewrite { in_place, root, file } => {
            let root = root.unwrap_or_else(|| PathBuf::from("."));
            let output = rewrite::rewrite_file(&root, &file)?;
            if in_place {
                sync::create_backup(&file)?;
                fs::write(&file, &output)?;
            } else {
                // Pass-through files may not be UTF-8
                std::io::stdout().write_all(&output)?;
            }
        }

        Cmd::Sync { from, to } => {
            sync::sync_tree(&from, &to)?;
        }
    }

    Ok(())
}
