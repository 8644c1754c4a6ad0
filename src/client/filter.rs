use std::sync::Arc;

use crate::ConfigResponse;
use crate::ListenerError;

/// Pluggable hook run over every delivery before the listener sees it.
/// Typical uses are decryption and placeholder expansion; a filter may
/// rewrite `content` in place. An error fails that one delivery, which is
/// retried on the next staleness check.
pub trait ConfigFilter: Send + Sync {
    fn filter(
        &self,
        response: &mut ConfigResponse,
    ) -> std::result::Result<(), ListenerError>;
}

/// Ordered chain of content filters shared by every cache entry of one worker
#[derive(Clone, Default)]
pub struct ConfigFilterChain {
    filters: Vec<Arc<dyn ConfigFilter>>,
}

impl ConfigFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(
        &mut self,
        filter: Arc<dyn ConfigFilter>,
    ) {
        self.filters.push(filter);
    }

    pub(crate) fn do_filter(
        &self,
        response: &mut ConfigResponse,
    ) -> std::result::Result<(), ListenerError> {
        for filter in &self.filters {
            filter.filter(response)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
