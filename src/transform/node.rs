//! Shared plumbing for transform nodes.
//!
//! A transform node wraps exactly one already-built parent view plus a
//! parameter record, so chains are singly rooted and acyclic by
//! construction. Nodes compute on demand from parent traces and never
//! memoize; repeated reads are observationally identical.

use crate::error::{Error, Result};
use crate::extractor::recording::RecordingView;
use std::sync::Arc;

/// Reject construction over a parent with no channels or no segments.
pub fn check_parent(kind: &str, parent: &Arc<dyn RecordingView>) -> Result<()> {
    if parent.channels().is_empty() {
        return Err(Error::InvalidChain {
            reason: format!("{kind} transform over a recording with no channels"),
        });
    }
    if parent.num_segments() == 0 {
        return Err(Error::InvalidChain {
            reason: format!("{kind} transform over a recording with no segments"),
        });
    }
    Ok(())
}
