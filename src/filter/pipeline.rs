//! Ordered assembly of chain nodes.
//!
//! Index 0 is always the [`Source`], the last index is always the output
//! [`Cache`], and user filters sit in between in insertion order.

use crate::error::{Result, SiftError};
use crate::filter::{Cache, DateFilter, Direction, Filter, FilterId, Source, StringFilter};
use crate::line::Line;
use crate::spinner::BusySpinner;
use std::sync::Arc;

/// The closed set of node kinds a pipeline holds
#[derive(Clone)]
pub enum FilterNode {
    Source(Arc<Source>),
    Keyword(Arc<StringFilter>),
    Date(Arc<DateFilter>),
    Cache(Arc<Cache>),
}

impl FilterNode {
    pub fn as_filter(&self) -> Arc<dyn Filter> {
        match self {
            FilterNode::Source(node) => Arc::clone(node) as Arc<dyn Filter>,
            FilterNode::Keyword(node) => Arc::clone(node) as Arc<dyn Filter>,
            FilterNode::Date(node) => Arc::clone(node) as Arc<dyn Filter>,
            FilterNode::Cache(node) => Arc::clone(node) as Arc<dyn Filter>,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FilterNode::Source(_) => "source",
            FilterNode::Keyword(_) => "keyword",
            FilterNode::Date(_) => "date",
            FilterNode::Cache(_) => "cache",
        }
    }
}

struct Stage {
    id: FilterId,
    node: FilterNode,
}

/// Source → user filters → Cache
pub struct Pipeline {
    stages: Vec<Stage>,
    source: Arc<Source>,
    output: Arc<Cache>,
    spinner: Arc<BusySpinner>,
}

impl Pipeline {
    /// Source + Cache floor
    pub const MIN_NODES: usize = 2;

    pub fn new(source: Arc<Source>, spinner: Arc<BusySpinner>) -> Self {
        let output = Arc::new(Cache::new(Arc::clone(&source) as Arc<dyn Filter>));
        let stages = vec![
            Stage {
                id: FilterId::SOURCE,
                node: FilterNode::Source(Arc::clone(&source)),
            },
            Stage {
                id: FilterId::OUTPUT,
                node: FilterNode::Cache(Arc::clone(&output)),
            },
        ];
        Self {
            stages,
            source,
            output,
            spinner,
        }
    }

    /// Insert a user filter directly before the output cache.
    pub fn add(&mut self, id: FilterId, node: FilterNode) -> Result<()> {
        if matches!(node, FilterNode::Source(_) | FilterNode::Cache(_)) {
            return Err(SiftError::invariant(format!(
                "a {} node cannot be added as a user filter",
                node.kind()
            )));
        }
        if self.position(id).is_some() {
            return Err(SiftError::invariant(format!("filter {id} already present")));
        }

        let tail = self.stages.len() - 1;
        let filter = node.as_filter();
        filter.set_source(self.stages[tail - 1].node.as_filter())?;
        self.stages[tail].node.as_filter().set_source(filter)?;
        self.stages.insert(tail, Stage { id, node });
        log::debug!("pipeline: added filter {id}, {} nodes", self.stages.len());
        Ok(())
    }

    /// Unlink a user filter, joining its neighbours.
    pub fn remove(&mut self, id: FilterId) -> Result<FilterNode> {
        if self.stages.len() <= Self::MIN_NODES {
            return Err(SiftError::NotEnoughFilters {
                minimum: Self::MIN_NODES,
            });
        }
        let idx = self.position(id).ok_or(SiftError::NotFound)?;
        if idx == 0 || idx == self.stages.len() - 1 {
            return Err(SiftError::invariant(format!(
                "the {} node cannot be removed",
                self.stages[idx].node.kind()
            )));
        }

        let before = self.stages[idx - 1].node.as_filter();
        self.stages[idx + 1].node.as_filter().set_source(before)?;
        let removed = self.stages.remove(idx);
        log::debug!("pipeline: removed filter {id}, {} nodes", self.stages.len());
        Ok(removed.node)
    }

    pub fn get(&self, id: FilterId) -> Option<&FilterNode> {
        self.position(id).map(|idx| &self.stages[idx].node)
    }

    fn position(&self, id: FilterId) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id == id)
    }

    /// Number of nodes, Source and Cache included
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// A pipeline always holds at least Source + Cache
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Node ids in chain order
    pub fn ids(&self) -> Vec<FilterId> {
        self.stages.iter().map(|stage| stage.id).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.stages.iter().map(|stage| &stage.node)
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    /// Tail of the chain; every viewport lookup goes through here
    pub fn output_filter(&self) -> Arc<dyn Filter> {
        Arc::clone(&self.output) as Arc<dyn Filter>
    }

    /// Clear every cache node after a configuration change
    pub fn invalidate_caches(&self) {
        for node in self.nodes() {
            if let FilterNode::Cache(cache) = node {
                cache.invalidate();
            }
        }
    }

    /// Re-resolve every date filter against the grown source, returning
    /// whether any bounds moved
    pub fn refresh_date_bounds(&self) -> Result<bool> {
        let mut changed = false;
        for node in self.nodes() {
            if let FilterNode::Date(filter) = node {
                changed |= filter.refresh_bounds()?;
            }
        }
        Ok(changed)
    }

    pub fn walker(&self) -> ChainWalker {
        ChainWalker::new(self.output_filter(), Arc::clone(&self.spinner))
    }

    pub fn get_line(&self, n: usize) -> Result<Line> {
        self.walker().get_line(n)
    }

    pub fn search(&self, start: usize, direction: Direction) -> Result<Line> {
        self.walker().search(start, direction)
    }

    pub fn find_non_hidden_line(&self, n: usize, direction: Direction) -> Result<Line> {
        self.walker().find_non_hidden_line(n, direction)
    }
}

/// Detached, cloneable view of a pipeline's output used by scans that run off
/// the coordinator (the asynchronous refresh).
#[derive(Clone)]
pub struct ChainWalker {
    output: Arc<dyn Filter>,
    spinner: Arc<BusySpinner>,
}

impl ChainWalker {
    pub fn new(output: Arc<dyn Filter>, spinner: Arc<BusySpinner>) -> Self {
        Self { output, spinner }
    }

    pub fn get_line(&self, n: usize) -> Result<Line> {
        self.spinner.tick();
        self.output.get_line(n)
    }

    pub fn length(&self) -> usize {
        self.output.length()
    }

    pub fn size(&self) -> usize {
        self.output.size()
    }

    /// Nearest line from `n` (inclusive) in `direction` that occupies a viewport row
    pub fn find_non_hidden_line(&self, n: usize, direction: Direction) -> Result<Line> {
        self.scan(n, direction, Line::is_visible)
            .unwrap_or(Err(SiftError::OutOfBounds { line: n }))
    }

    /// Nearest visible search target from `start` (inclusive) in `direction`
    pub fn search(&self, start: usize, direction: Direction) -> Result<Line> {
        self.scan(start, direction, |line| line.matched && line.is_visible())
            .unwrap_or(Err(SiftError::NotFound))
    }

    fn scan<P>(&self, start: usize, direction: Direction, accept: P) -> Option<Result<Line>>
    where
        P: Fn(&Line) -> bool,
    {
        let len = self.length();
        let mut cursor = match direction {
            Direction::Down => Some(start),
            Direction::Up if len == 0 => None,
            Direction::Up => Some(start.min(len - 1)),
        };

        while let Some(n) = cursor {
            if n >= len {
                break;
            }
            match self.get_line(n) {
                Ok(line) if accept(&line) => return Some(Ok(line)),
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }
            cursor = direction.step(n);
        }
        None
    }
}
