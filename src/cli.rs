// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command-line definition for the EtherDFS server.
// Author: Lukas Bower

use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

/// Command-line flags for the EtherDFS server.
///
/// Each path is assigned to the next drive letter starting at C:, so at
/// most 24 roots can be served.
#[derive(Debug, Parser)]
#[command(
    name = "ethersrv",
    about = "EtherDFS server: serves local directories to DOS clients over raw Ethernet"
)]
pub struct Args {
    /// Keep in foreground (do not daemonize)
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Verbose / debug mode (logs to stderr)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Network interface to listen on
    pub interface: String,

    /// Directories served as drives C: through Z:, in order
    #[arg(required = true, num_args = 1..=24, value_name = "PATH")]
    pub roots: Vec<PathBuf>,
}

/// Parse the command line, exiting 0 for `-h` and 1 for usage errors.
pub fn parse() -> Args {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            print!("{err}");
            process::exit(0);
        }
        Err(err) => {
            eprint!("{err}");
            process::exit(1);
        }
    };
    for root in &args.roots {
        if root.as_os_str().to_string_lossy().ends_with('/') {
            eprintln!(
                "ERROR: root path '{}' must not end with a slash",
                root.display()
            );
            process::exit(1);
        }
    }
    args
}
