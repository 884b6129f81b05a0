//! Crate-wide error taxonomy (`spec.md` §7). Per-item ingest failures are
//! logged and skipped rather than returned as `Err`; only structural
//! failures — interface-contract violations, invariant breaches — reach
//! these types and are fatal to the current scheduling request.

use std::fmt;

#[derive(Debug, Clone, strum_macros::Display)]
pub enum CollectorError {
    InvalidInput(String),
    MissingData(String),
}

#[derive(Debug, Clone, strum_macros::Display)]
pub enum RankerError {
    /// OR-group scoring is an explicit non-goal (`spec.md` §9).
    Unsupported(String),
}

#[derive(Debug, Clone, strum_macros::Display)]
pub enum SelectorError {
    NestedSchedulingGroup(String),
}

#[derive(Debug, Clone, strum_macros::Display)]
pub enum EventLoopError {
    OutOfOrderEvent(String),
}

#[derive(Debug, Clone, strum_macros::Display)]
pub enum AccountingError {
    InvalidBound(String),
}

/// Top-level error returned by fallible crate entry points.
#[derive(Debug, Clone)]
pub enum SchedError {
    InvalidInput(String),
    Unsupported(String),
    Timeout,
    Collector(CollectorError),
    Ranker(RankerError),
    Selector(SelectorError),
    EventLoop(EventLoopError),
    Accounting(AccountingError),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SchedError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            SchedError::Timeout => write!(f, "TIMEOUT"),
            SchedError::Collector(e) => write!(f, "collector error: {e}"),
            SchedError::Ranker(e) => write!(f, "ranker error: {e}"),
            SchedError::Selector(e) => write!(f, "selector error: {e}"),
            SchedError::EventLoop(e) => write!(f, "event loop error: {e}"),
            SchedError::Accounting(e) => write!(f, "accounting error: {e}"),
        }
    }
}

impl std::error::Error for SchedError {}

impl From<CollectorError> for SchedError {
    fn from(e: CollectorError) -> Self { SchedError::Collector(e) }
}
impl From<RankerError> for SchedError {
    fn from(e: RankerError) -> Self { SchedError::Ranker(e) }
}
impl From<SelectorError> for SchedError {
    fn from(e: SelectorError) -> Self { SchedError::Selector(e) }
}
impl From<EventLoopError> for SchedError {
    fn from(e: EventLoopError) -> Self { SchedError::EventLoop(e) }
}
impl From<AccountingError> for SchedError {
    fn from(e: AccountingError) -> Self { SchedError::Accounting(e) }
}
