//! Post-selection configuration filters.

use std::sync::Arc;

/// Accepts or rejects a materialized configuration.
pub trait ConfFilter<C>: Send + Sync {
    fn check(&self, conf: &C) -> bool;
}

impl<C, F> ConfFilter<C> for F
where
    F: Fn(&C) -> bool + Send + Sync,
{
    fn check(&self, conf: &C) -> bool {
        self(conf)
    }
}

/// Chain of filters; a configuration is kept only if every filter accepts it.
pub struct ConfFilters<C> {
    filters: Vec<Arc<dyn ConfFilter<C>>>,
}

impl<C> Default for ConfFilters<C> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<C> Clone for ConfFilters<C> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

impl<C> ConfFilters<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, filter: impl ConfFilter<C> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn check(&self, conf: &C) -> bool {
        self.filters.iter().all(|f| f.check(conf))
    }

    pub fn apply(&self, confs: Vec<C>) -> Vec<C> {
        if self.filters.is_empty() {
            return confs;
        }
        confs.into_iter().filter(|c| self.check(c)).collect()
    }
}
