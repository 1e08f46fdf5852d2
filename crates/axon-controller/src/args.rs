#![doc(hidden)]

use clap::Parser;

/// Arguments for the `axon-controller` process.
#[derive(Parser, Debug)]
#[command(version, about = "axon controller: shards rules across worker processes and routes mutation RPCs")]
pub struct Args {
    #[clap(
        long,
        value_name = "PATH",
        help = "UNIX socket this controller's own RPC server listens on (mutation + heartbeat ingestion)"
    )]
    pub rpc_socket: String,

    #[clap(
        long,
        value_name = "DIR",
        help = "Directory containing the axon-client/axon-server worker binaries; defaults to this binary's own directory"
    )]
    pub binary_dir: Option<String>,

    #[clap(
        long,
        value_name = "DIR",
        default_value_t = std::env::temp_dir().display().to_string(),
        help = "Directory spawned workers' RPC sockets are created under"
    )]
    pub socket_dir: String,

    #[clap(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Don't print any messages except for errors",
        default_value_t = false
    )]
    pub quiet: bool,

    #[clap(
        short = 'v',
        long,
        conflicts_with = "quiet",
        action = clap::ArgAction::Count,
        help = "Output details about sharding/spawn decisions; specify multiple times for more detail"
    )]
    pub verbose: u8,
}

impl Args {
    pub fn verbosity(&self) -> axon_common::logging::Verbosity {
        axon_common::logging::Verbosity {
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }

    /// Resolves `--binary-dir`, defaulting to the directory this controller
    /// binary was run from (workspace builds place every `[[bin]]` target in
    /// the same directory).
    pub fn resolved_binary_dir(&self) -> std::io::Result<std::path::PathBuf> {
        match &self.binary_dir {
            Some(dir) => Ok(std::path::PathBuf::from(dir)),
            None => {
                let exe = std::env::current_exe()?;
                Ok(exe
                    .parent()
                    .map(std::path::Path::to_path_buf)
                    .unwrap_or_else(|| std::path::PathBuf::from(".")))
            }
        }
    }
}
