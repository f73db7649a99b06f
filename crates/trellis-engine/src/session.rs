//! Query execution against a store.
//!
//! A [`Session`] owns the store handle, the engine configuration and the
//! cancellation token for the queries it runs. Each call compiles the path,
//! optimizes it (unless disabled), drives the root scanner and closes it on
//! every exit path.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::optimizer::Optimizer;
use crate::path::Path;
use crate::shape::{describe, Description, Scanner, ShapeRef, Tags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore, Value};

/// Tag under which every result reports its own node.
pub const TOP_RESULT_TAG: &str = "id";

/// One result row: the node reached and every tag bound on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub id: Handle,
    /// Includes [`TOP_RESULT_TAG`].
    pub tags: Tags,
}

impl QueryResult {
    /// Resolve every tag to its value.
    pub fn resolve(&self, store: &dyn QuadStore) -> Result<BTreeMap<String, Value>, QueryError> {
        self.tags
            .iter()
            .map(|(name, &handle)| {
                store
                    .resolve(handle)
                    .map(|value| (name.clone(), value))
                    .ok_or(QueryError::UnknownHandle(handle))
            })
            .collect()
    }

    pub fn get(&self, tag: &str) -> Option<Handle> {
        self.tags.get(tag).copied()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    store: Arc<dyn QuadStore>,
    config: EngineConfig,
    cancel: CancelToken,
}

impl Session {
    pub fn new(store: Arc<dyn QuadStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, QueryError> {
        config
            .validate()
            .map_err(|err| QueryError::Config(err.to_string()))?;
        self.config = config;
        Ok(self)
    }

    /// Run subsequent queries under `cancel` (shared with its clones).
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<dyn QuadStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Compile `path` and, when enabled, optimize it to a fixpoint.
    pub fn prepare(&self, path: &Path) -> Result<ShapeRef, QueryError> {
        let shape = path.compile_with(Arc::clone(&self.store), &self.config);
        if !self.config.optimize {
            return Ok(shape);
        }
        Optimizer::from_config(&self.config).run(shape, &self.cancel)
    }

    /// The prepared plan with size estimates.
    pub fn explain(&self, path: &Path) -> Result<Description, QueryError> {
        let shape = self.prepare(path)?;
        Ok(describe(&shape, &self.cancel))
    }

    /// Feed results to `f` until the plan is exhausted, `limit` rows have been
    /// produced, or `f` breaks. Returns the number of rows delivered.
    ///
    /// With `include_paths` set, each alternate binding set of a result is
    /// its own row and counts toward the limit.
    pub fn for_each<F>(&self, path: &Path, limit: Option<usize>, mut f: F) -> Result<usize, QueryError>
    where
        F: FnMut(QueryResult) -> ControlFlow<()>,
    {
        self.run(path, limit, self.config.include_paths, &mut f)
    }

    pub fn collect(&self, path: &Path, limit: Option<usize>) -> Result<Vec<QueryResult>, QueryError> {
        let mut out = Vec::new();
        self.for_each(path, limit, |row| {
            out.push(row);
            ControlFlow::Continue(())
        })?;
        Ok(out)
    }

    /// Resolved values of the results, one per result (alternate paths ignored).
    pub fn values(&self, path: &Path, limit: Option<usize>) -> Result<Vec<Value>, QueryError> {
        let mut handles = Vec::new();
        self.run(path, limit, false, &mut |row: QueryResult| {
            handles.push(row.id);
            ControlFlow::Continue(())
        })?;
        handles
            .into_iter()
            .map(|h| self.store.resolve(h).ok_or(QueryError::UnknownHandle(h)))
            .collect()
    }

    pub fn first(&self, path: &Path) -> Result<Option<Value>, QueryError> {
        Ok(self.values(path, Some(1))?.into_iter().next())
    }

    /// Number of rows [`Session::for_each`] would deliver without a limit.
    pub fn count(&self, path: &Path) -> Result<usize, QueryError> {
        self.for_each(path, Some(0), |_| ControlFlow::Continue(()))
    }

    fn run(
        &self,
        path: &Path,
        limit: Option<usize>,
        with_paths: bool,
        f: &mut dyn FnMut(QueryResult) -> ControlFlow<()>,
    ) -> Result<usize, QueryError> {
        let shape = self.prepare(path)?;
        // Some(0) asks for everything, even over a configured default.
        let limit = limit.or(self.config.default_limit).filter(|&n| n > 0);
        tracing::debug!(root = shape.name(), ?limit, with_paths, "running query");

        let mut it = shape.iterate();
        let outcome = drive(it.as_mut(), &self.cancel, limit, with_paths, f);
        let closed = it.close();
        let rows = outcome?;
        closed?;
        tracing::debug!(rows, "query finished");
        Ok(rows)
    }
}

fn drive(
    it: &mut dyn Scanner,
    cancel: &CancelToken,
    limit: Option<usize>,
    with_paths: bool,
    f: &mut dyn FnMut(QueryResult) -> ControlFlow<()>,
) -> Result<usize, QueryError> {
    let full = |rows: usize| limit.is_some_and(|n| rows >= n);
    let mut rows = 0;
    'results: while !full(rows) && it.next(cancel) {
        loop {
            if let Some(id) = it.result() {
                let mut tags = Tags::new();
                it.tag_results(&mut tags);
                tags.insert(TOP_RESULT_TAG.to_string(), id);
                rows += 1;
                if f(QueryResult { id, tags }).is_break() {
                    break 'results;
                }
            }
            if !with_paths || full(rows) || !it.next_path(cancel) {
                break;
            }
        }
    }
    match it.err() {
        Some(err) => Err(err.clone()),
        None => Ok(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_store::fixtures::social_graph;

    fn session() -> Session {
        Session::new(Arc::new(social_graph()))
    }

    #[test]
    fn test_collect_tags_id() {
        let s = session();
        let rows = s
            .collect(&Path::vertex(["<alice>"]).out("<follows>"), None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get(TOP_RESULT_TAG), Some(row.id));
        let resolved = row.resolve(s.store().as_ref()).unwrap();
        assert_eq!(resolved[TOP_RESULT_TAG], Value::iri("bob"));
    }

    #[test]
    fn test_limit_and_break() {
        let s = session();
        let all = Path::all();
        assert_eq!(s.collect(&all, Some(3)).unwrap().len(), 3);

        let mut seen = 0;
        let rows = s
            .for_each(&all, None, |_| {
                seen += 1;
                if seen == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_zero_limit_overrides_default() {
        let config = EngineConfig {
            default_limit: Some(2),
            ..EngineConfig::default()
        };
        let s = session().with_config(config).unwrap();
        assert_eq!(s.values(&Path::all(), None).unwrap().len(), 2);
        assert_eq!(s.count(&Path::all()).unwrap(), 14);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_optimize_passes: 0,
            ..EngineConfig::default()
        };
        let err = session().with_config(config).unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn test_cancelled_session_fails() {
        let s = session();
        s.cancel_token().cancel();
        let err = s.collect(&Path::all(), None).unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_first_and_missing() {
        let s = session();
        assert_eq!(
            s.first(&Path::vertex(["<alice>"])).unwrap(),
            Some(Value::iri("alice"))
        );
        assert_eq!(s.first(&Path::vertex(["<nobody>"])).unwrap(), None);
    }

    #[test]
    fn test_explain_reports_plan() {
        let s = session();
        let plan = s
            .explain(&Path::vertex(["<alice>", "<bob>"]).is(["<bob>"]))
            .unwrap();
        assert_eq!(plan.name, "and");
        assert_eq!(plan.children.len(), 2);
    }
}
