//! Shared logging bootstrap for the `axon-client`, `axon-server`, and
//! `axon-controller` binaries.
//!
//! Each binary's `Args` exposes a `-v/--verbose` counter and a `-q/--quiet`
//! flag; `init` turns those into a `tracing` filter, deduplicated here into
//! one shared helper instead of copy-pasted inline in each `main.rs`.

use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Verbosity knobs shared by every `axon` binary's CLI args.
#[derive(Debug, Clone, Copy)]
pub struct Verbosity {
    pub quiet: bool,
    pub verbose: u8,
}

impl Verbosity {
    fn level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Initialize the global `tracing` subscriber. Third-party crates that are
/// chatty at INFO (`mio`, `rustls`) are held at WARN unless `-vv` or higher
/// is requested.
pub fn init(verbosity: Verbosity) {
    let verbosity_level = verbosity.level();

    let noisy_level = match verbosity.verbose {
        0 | 1 => Level::WARN,
        2 => Level::INFO,
        _ => verbosity_level,
    };

    let filters = filter::Targets::new()
        .with_target("mio", noisy_level)
        .with_target("rustls", noisy_level)
        .with_default(verbosity_level);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(filters);

    tracing_subscriber::registry().with(fmt_layer).init();
}
