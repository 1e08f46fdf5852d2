#![doc(hidden)]

use clap::Parser;

/// Arguments for the `axon-server` worker process.
#[derive(Parser, Debug)]
#[command(version, about = "axon server worker: hosts TCP/UDP/HTTP/HTTPS listeners for assigned rules")]
pub struct Args {
    #[clap(long, value_name = "PATH", help = "UNIX socket this worker's RPC server listens on")]
    pub rpc_socket: String,

    #[clap(
        long,
        value_name = "PATH",
        default_value = crate::tls::DEFAULT_CERT_PATH,
        help = "TLS certificate (PEM) for HTTPS listeners"
    )]
    pub tls_cert: String,

    #[clap(
        long,
        value_name = "PATH",
        default_value = crate::tls::DEFAULT_KEY_PATH,
        help = "TLS private key (PEM) for HTTPS listeners"
    )]
    pub tls_key: String,

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
        help = "Output details about listener activity; specify multiple times for more detail"
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
