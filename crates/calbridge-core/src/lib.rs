//! Core types: event drafts, upcoming events, tracing setup

pub mod event;
pub mod tracing;

pub use event::{
    DEFAULT_DURATION_MINUTES, DEFAULT_TIMEZONE, DraftError, EventDraft, EventTimestamp, NO_TITLE,
    UpcomingEvent,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
