/// Rejection of a scan start while another scan is still running.
///
/// The request is neither queued nor silently ignored; the caller decides
/// whether to wait or to read the running scan's status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("an inventory scan is already in progress")]
pub struct ScanInProgress;
