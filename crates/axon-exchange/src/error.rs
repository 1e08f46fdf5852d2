use thiserror::Error;

/// Errors surfaced by `Exchange::send`. Per-subscriber fan-out capacity
/// failures are not surfaced here — they're logged and the message is
/// silently dropped for that one subscriber, since a slow subscriber must
/// never hold up delivery to the others.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange ingest queue is closed")]
    Closed,
}

/// Errors a `Subscriber::handle` implementation can report. The dispatch
/// loop logs these; they never propagate back to the sender.
#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("record store error: {0}")]
    Store(#[from] axon_store::StoreError),

    #[error("telemetry sink io error: {0}")]
    Io(#[from] std::io::Error),
}
