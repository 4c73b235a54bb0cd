//! Invocation Filters
//!
//! Executing handlers run in registration order before the body; executed
//! handlers run in reverse order after it (stack discipline):
//!
//! ```text
//! A.executing → B.executing → body → B.executed → A.executed
//! ```
//!
//! If an executing handler fails, the body and the executed phase are
//! skipped. Filters that already ran are not unwound unless they opt into
//! [`FunctionFilter::observes_aborted_start`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, WeftError};

use super::context::InvocationContext;

/// How the invocation ended, as seen by an executed handler
#[derive(Debug, Clone, Copy)]
pub enum FunctionOutcome<'a> {
    Succeeded,
    /// The body (or an output binding) failed
    Failed(&'a WeftError),
    /// An executing handler failed; the body never ran
    StartAborted(&'a WeftError),
}

impl<'a> FunctionOutcome<'a> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn error(&self) -> Option<&'a WeftError> {
        match self {
            Self::Succeeded => None,
            Self::Failed(e) | Self::StartAborted(e) => Some(e),
        }
    }
}

/// Pre/post invocation hook
#[async_trait]
pub trait FunctionFilter: Send + Sync {
    fn name(&self) -> &str;

    async fn executing(&self, _context: &InvocationContext) -> Result<(), BoxError> {
        Ok(())
    }

    async fn executed(&self, _context: &InvocationContext, _outcome: FunctionOutcome<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Receive `executed` with [`FunctionOutcome::StartAborted`] when a later
    /// executing handler fails after this filter's executing handler ran
    fn observes_aborted_start(&self) -> bool {
        false
    }
}

/// Ordered filter list attached to a function or a host
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn FunctionFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl FunctionFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn push(&mut self, filter: Arc<dyn FunctionFilter>) {
        self.filters.push(filter);
    }

    /// Host filters first, then this chain's
    pub fn after(&self, outer: &FilterChain) -> FilterChain {
        FilterChain {
            filters: outer
                .filters
                .iter()
                .chain(self.filters.iter())
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn FunctionFilter>> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl FunctionFilter for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn host_filters_come_first() {
        let host = FilterChain::new().with(Named("host"));
        let function = FilterChain::new().with(Named("a")).with(Named("b"));
        let chain = function.after(&host);
        let names: Vec<&str> = chain.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["host", "a", "b"]);
        assert_eq!(format!("{:?}", function), r#"["a", "b"]"#);
    }

    #[test]
    fn outcome_accessors() {
        let err = WeftError::Cancelled { function: "f".into() };
        assert!(FunctionOutcome::Succeeded.is_success());
        assert!(FunctionOutcome::Failed(&err).error().is_some());
        assert!(!FunctionOutcome::StartAborted(&err).is_success());
    }
}
