#![doc(hidden)]

use clap::Parser;

/// Arguments for the `axon-client` worker process.
#[derive(Parser, Debug)]
#[command(version, about = "axon client worker: dispatches measurement traffic for assigned rules")]
pub struct Args {
    #[clap(long, value_name = "PATH", help = "UNIX socket this worker's RPC server listens on")]
    pub rpc_socket: String,

    #[clap(
        long,
        value_name = "PATH",
        help = "UNIX socket of the controller's RPC server, used to deliver heartbeats"
    )]
    pub controller_socket: Option<String>,

    #[clap(
        long,
        value_name = "N",
        help = "Maximum probes in flight at once",
        default_value_t = crate::pool::DEFAULT_POOL_SIZE
    )]
    pub pool_size: usize,

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
        help = "Output details about probes; specify multiple times for more detail"
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
}
