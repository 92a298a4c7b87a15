use floorline_bus::BusError;
use thiserror::Error;

/// Why an inbound request was dropped at ingestion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("request is missing {0}")]
    MissingField(&'static str),

    #[error("conversation '{0}' is already queued")]
    Duplicate(String),

    #[error("queue full ({len}/{capacity})")]
    QueueFull { capacity: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("conversation '{0}' is not queued")]
    UnknownConversation(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}
