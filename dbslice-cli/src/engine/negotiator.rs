//! Download negotiation: preview until the slice fits, then commit
//!
//! The export executor bounds every dry run by an aggregate row ceiling.
//! The client previews, raises the ceiling in fixed increments while the
//! service reports the ceiling was reached, and only commits once a preview
//! came back under the ceiling with at least one row.

use std::collections::HashMap;

use crate::api::models::{DownloadRequest, DownloadResponse};
use crate::api::transport::SliceApi;

use super::dependency::Dependency;
use super::error::SliceError;
use super::events::{StatusBus, StatusEvent};
use super::queries::strip_empty_values;
use super::table_name::TableName;

/// Fixed amount the row ceiling is raised by per escalation.
pub const MAX_ROWS_INCREMENT: u64 = 1000;

/// Starting row ceiling for a fresh negotiation.
pub const DEFAULT_MAX_ROWS: u64 = 1000;

/// Protocol state. `Idle` with a warning set means the last preview hit the
/// ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    Idle,
    Previewing,
    Ready,
    Committing,
}

/// Which bulk endpoint a flat table-set download goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    /// `POST /download/model`
    Model,
    /// `POST /download/bulk`
    Bulk,
}

impl BulkMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Bulk => "bulk",
        }
    }
}

/// What is being downloaded: a pruned dependency tree or a flat closure
/// set.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadTarget {
    Tree(Dependency),
    Tables { tables: Vec<TableName>, mode: BulkMode },
}

impl DownloadTarget {
    pub fn tree(tree: Dependency) -> Self {
        Self::Tree(tree)
    }

    pub fn tables(tables: Vec<TableName>, mode: BulkMode) -> Self {
        Self::Tables { tables, mode }
    }
}

/// The preview/commit state machine, one instance per negotiation.
///
/// `Idle → Previewing → (ceiling reached ? Idle-with-warning : Ready) →
/// Committing → Idle`. A failed call surfaces its error verbatim and leaves
/// every piece of client state untouched.
#[derive(Debug)]
pub struct DownloadNegotiator {
    dataset: String,
    max_rows: u64,
    auto_refresh: bool,
    /// Something previewable changed since the last applied preview.
    dirty: bool,
    phase: NegotiationPhase,
    last_preview: Option<DownloadResponse>,
    warning: Option<String>,
    /// Filters for the legacy flat single-table path only; the tree path
    /// carries filters inside its pruned nodes.
    query_values: HashMap<String, String>,
    seq: u64,
    bus: StatusBus,
}

impl DownloadNegotiator {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            max_rows: DEFAULT_MAX_ROWS,
            auto_refresh: false,
            dirty: true,
            phase: NegotiationPhase::Idle,
            last_preview: None,
            warning: None,
            query_values: HashMap::new(),
            seq: 0,
            bus: StatusBus::new(),
        }
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&StatusEvent) + Send + Sync + 'static) {
        self.bus.subscribe(subscriber);
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn last_preview(&self) -> Option<&DownloadResponse> {
        self.last_preview.as_ref()
    }

    pub fn set_auto_refresh(&mut self, auto_refresh: bool) {
        self.auto_refresh = auto_refresh;
    }

    pub fn set_dataset(&mut self, dataset: impl Into<String>) {
        self.dataset = dataset.into();
        self.mark_changed();
    }

    /// Legacy flat-path filters; replaced wholesale.
    pub fn set_query_values(&mut self, query_values: HashMap<String, String>) {
        self.query_values = query_values;
        self.mark_changed();
    }

    /// The tree or selection changed under this negotiation; any previous
    /// preview no longer authorizes a commit.
    pub fn mark_changed(&mut self) {
        self.dirty = true;
        if self.phase == NegotiationPhase::Ready {
            self.phase = NegotiationPhase::Idle;
        }
    }

    /// Raise the ceiling by the fixed increment.
    pub fn escalate(&mut self) -> u64 {
        self.max_rows += MAX_ROWS_INCREMENT;
        self.mark_changed();
        self.bus.publish(&StatusEvent::CeilingRaised {
            max_rows: self.max_rows,
        });
        self.max_rows
    }

    fn build_request(&self, target: &DownloadTarget, dry_run: bool) -> DownloadRequest {
        let (dependency, table_names) = match target {
            DownloadTarget::Tree(tree) => {
                let mut pruned = tree.prune();
                pruned.drop_empty_queries();
                (Some(pruned), None)
            }
            DownloadTarget::Tables { tables, .. } => (None, Some(tables.clone())),
        };
        DownloadRequest {
            dataset: self.dataset.clone(),
            dependency,
            table_names,
            query_values: strip_empty_values(&self.query_values),
            dry_run,
            max_rows: self.max_rows,
        }
    }

    async fn dispatch(
        &self,
        api: &dyn SliceApi,
        target: &DownloadTarget,
        request: &DownloadRequest,
    ) -> Result<DownloadResponse, SliceError> {
        match target {
            DownloadTarget::Tree(_) => api.download(request).await,
            DownloadTarget::Tables { mode: BulkMode::Model, .. } => {
                api.download_model(request).await
            }
            DownloadTarget::Tables { mode: BulkMode::Bulk, .. } => {
                api.download_bulk(request).await
            }
        }
    }

    /// Issue a preview request: returns its sequence number and body.
    pub fn begin_preview(&mut self, target: &DownloadTarget) -> (u64, DownloadRequest) {
        self.phase = NegotiationPhase::Previewing;
        self.seq += 1;
        self.bus.publish(&StatusEvent::PreviewStarted {
            max_rows: self.max_rows,
        });
        (self.seq, self.build_request(target, true))
    }

    /// Apply a preview response. Returns `false` (state untouched) if a
    /// newer preview has been issued since `seq`.
    pub fn apply_preview(&mut self, seq: u64, response: DownloadResponse) -> bool {
        if seq != self.seq {
            log::debug!("dropping stale preview response (seq {} < {})", seq, self.seq);
            self.bus.publish(&StatusEvent::StaleResponseDropped { seq });
            return false;
        }
        self.bus.publish(&StatusEvent::PreviewCompleted {
            row_count: response.row_count,
            max_rows_reached: response.max_rows_reached,
        });
        if response.max_rows_reached {
            self.phase = NegotiationPhase::Idle;
            self.warning = Some(format!(
                "row ceiling of {} reached; raise the ceiling and preview again",
                self.max_rows
            ));
        } else {
            self.phase = NegotiationPhase::Ready;
            self.warning = None;
        }
        self.last_preview = Some(response);
        self.dirty = false;
        true
    }

    /// Run one dry-run round trip. Returns whether the response was applied
    /// (`false` means it arrived stale and was discarded).
    pub async fn preview(
        &mut self,
        api: &dyn SliceApi,
        target: &DownloadTarget,
    ) -> Result<bool, SliceError> {
        let (seq, request) = self.begin_preview(target);
        match self.dispatch(api, target, &request).await {
            Ok(response) => Ok(self.apply_preview(seq, response)),
            Err(error) => {
                self.phase = NegotiationPhase::Idle;
                self.bus.publish(&StatusEvent::Failed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Re-preview automatically if auto-refresh is on and something changed
    /// since the last applied preview.
    pub async fn maybe_preview(
        &mut self,
        api: &dyn SliceApi,
        target: &DownloadTarget,
    ) -> Result<bool, SliceError> {
        if self.auto_refresh && self.dirty {
            self.preview(api, target).await
        } else {
            Ok(false)
        }
    }

    /// A commit is permitted only while `Ready`: the latest preview fit
    /// under the ceiling, counted at least one row, and nothing has changed
    /// since.
    pub fn can_commit(&self) -> bool {
        self.phase == NegotiationPhase::Ready
            && !self.dirty
            && self
                .last_preview
                .as_ref()
                .is_some_and(|preview| !preview.max_rows_reached && preview.row_count > 0)
    }

    fn commit_refusal(&self) -> String {
        match &self.last_preview {
            None => "no preview has been run".to_string(),
            Some(preview) if preview.max_rows_reached => {
                "the last preview hit the row ceiling".to_string()
            }
            Some(preview) if preview.row_count == 0 => {
                "the last preview selected no rows".to_string()
            }
            Some(_) => "the slice changed since the last preview".to_string(),
        }
    }

    /// Execute the real export. The request is identical to the last
    /// preview's except for `dryRun`; on success the returned counts are
    /// finalized, on failure nothing is assumed written.
    pub async fn commit(
        &mut self,
        api: &dyn SliceApi,
        target: &DownloadTarget,
    ) -> Result<DownloadResponse, SliceError> {
        if !self.can_commit() {
            return Err(SliceError::Commit(format!(
                "refusing to commit: {}",
                self.commit_refusal()
            )));
        }
        self.phase = NegotiationPhase::Committing;
        self.bus.publish(&StatusEvent::CommitStarted {
            max_rows: self.max_rows,
        });

        let request = self.build_request(target, false);
        match self.dispatch(api, target, &request).await {
            Ok(response) => {
                self.phase = NegotiationPhase::Idle;
                self.warning = None;
                self.bus.publish(&StatusEvent::CommitCompleted {
                    row_count: response.row_count,
                });
                Ok(response)
            }
            Err(error) => {
                // The preview still stands; the commit may simply be
                // retried.
                self.phase = NegotiationPhase::Ready;
                self.bus.publish(&StatusEvent::Failed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{TableInfo, TableMetadata, TableRowCount};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executor double with a fixed true row count: accumulates up to the
    /// ceiling and reports whether it was reached, like the real service.
    struct FakeExecutor {
        true_row_count: u64,
        fail: bool,
        tree_calls: AtomicUsize,
        bulk_calls: AtomicUsize,
        model_calls: AtomicUsize,
        commits: AtomicUsize,
    }

    impl FakeExecutor {
        fn new(true_row_count: u64) -> Self {
            Self {
                true_row_count,
                fail: false,
                tree_calls: AtomicUsize::new(0),
                bulk_calls: AtomicUsize::new(0),
                model_calls: AtomicUsize::new(0),
                commits: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(0)
            }
        }

        fn respond(&self, request: &DownloadRequest) -> Result<DownloadResponse, SliceError> {
            if self.fail {
                let message = "executor unavailable".to_string();
                return Err(if request.dry_run {
                    SliceError::Preview(message)
                } else {
                    SliceError::Commit(message)
                });
            }
            if !request.dry_run {
                self.commits.fetch_add(1, Ordering::SeqCst);
            }
            let max_rows_reached = self.true_row_count > request.max_rows;
            let row_count = self.true_row_count.min(request.max_rows);
            Ok(DownloadResponse {
                table_row_counts: vec![TableRowCount {
                    table_name: TableName::bare("Orders"),
                    display_name: "Orders".to_string(),
                    row_count,
                    rows_skipped: 0,
                }],
                row_count,
                rows_skipped: 0,
                max_rows_reached,
            })
        }
    }

    #[async_trait]
    impl SliceApi for FakeExecutor {
        async fn resolve_dependencies(&self, _tree: &Dependency) -> Result<Dependency, SliceError> {
            unimplemented!("not used by negotiator tests")
        }

        async fn table_metadata(&self, _table: &TableName) -> Result<TableMetadata, SliceError> {
            unimplemented!("not used by negotiator tests")
        }

        async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse, SliceError> {
            self.tree_calls.fetch_add(1, Ordering::SeqCst);
            self.respond(request)
        }

        async fn download_model(
            &self,
            request: &DownloadRequest,
        ) -> Result<DownloadResponse, SliceError> {
            self.model_calls.fetch_add(1, Ordering::SeqCst);
            self.respond(request)
        }

        async fn download_bulk(
            &self,
            request: &DownloadRequest,
        ) -> Result<DownloadResponse, SliceError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            self.respond(request)
        }

        async fn content(&self) -> Result<Vec<TableInfo>, SliceError> {
            unimplemented!("not used by negotiator tests")
        }

        async fn datasets(&self) -> Result<Vec<String>, SliceError> {
            unimplemented!("not used by negotiator tests")
        }
    }

    fn tree_target() -> DownloadTarget {
        DownloadTarget::tree(Dependency::root(TableName::bare("Orders")))
    }

    #[tokio::test]
    async fn test_ceiling_escalation_until_fit() {
        let api = FakeExecutor::new(2500);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        assert!(negotiator.preview(&api, &target).await.unwrap());
        assert_eq!(negotiator.phase(), NegotiationPhase::Idle);
        assert!(negotiator.warning().is_some());
        assert!(!negotiator.can_commit());
        assert_eq!(negotiator.last_preview().unwrap().row_count, 1000);

        assert_eq!(negotiator.escalate(), 2000);
        negotiator.preview(&api, &target).await.unwrap();
        assert!(negotiator.warning().is_some());

        assert_eq!(negotiator.escalate(), 3000);
        negotiator.preview(&api, &target).await.unwrap();
        assert_eq!(negotiator.phase(), NegotiationPhase::Ready);
        assert_eq!(negotiator.warning(), None);
        let preview = negotiator.last_preview().unwrap();
        assert_eq!(preview.row_count, 2500);
        assert!(!preview.max_rows_reached);
        assert!(negotiator.can_commit());
    }

    #[tokio::test]
    async fn test_commit_happy_path() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        negotiator.preview(&api, &target).await.unwrap();
        let response = negotiator.commit(&api, &target).await.unwrap();

        assert_eq!(response.row_count, 40);
        assert_eq!(negotiator.phase(), NegotiationPhase::Idle);
        assert_eq!(api.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_refused_without_satisfying_preview() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        // No preview at all.
        let error = negotiator.commit(&api, &target).await.unwrap_err();
        assert!(matches!(error, SliceError::Commit(_)));

        // Zero-row preview.
        let empty_api = FakeExecutor::new(0);
        negotiator.preview(&empty_api, &target).await.unwrap();
        assert!(!negotiator.can_commit());

        // Ceiling-hit preview.
        let big_api = FakeExecutor::new(5000);
        negotiator.preview(&big_api, &target).await.unwrap();
        assert!(!negotiator.can_commit());

        assert_eq!(api.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_change_after_preview_invalidates_commit() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        negotiator.preview(&api, &target).await.unwrap();
        assert!(negotiator.can_commit());

        negotiator.mark_changed();
        assert!(!negotiator.can_commit());

        negotiator.preview(&api, &target).await.unwrap();
        assert!(negotiator.can_commit());
    }

    #[tokio::test]
    async fn test_failed_preview_keeps_prior_state() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();
        negotiator.preview(&api, &target).await.unwrap();
        let before = negotiator.last_preview().cloned();

        let failing = FakeExecutor::failing();
        let error = negotiator.preview(&failing, &target).await.unwrap_err();
        assert!(matches!(error, SliceError::Preview(_)));
        assert_eq!(negotiator.phase(), NegotiationPhase::Idle);
        assert_eq!(negotiator.last_preview().cloned(), before);
    }

    #[tokio::test]
    async fn test_failed_commit_can_be_retried() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();
        negotiator.preview(&api, &target).await.unwrap();

        let failing = FakeExecutor::failing();
        let error = negotiator.commit(&failing, &target).await.unwrap_err();
        assert!(matches!(error, SliceError::Commit(_)));
        assert_eq!(negotiator.phase(), NegotiationPhase::Ready);
        assert!(negotiator.can_commit());

        negotiator.commit(&api, &target).await.unwrap();
        assert_eq!(api.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_preview_response_is_discarded() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        let (first_seq, first_request) = negotiator.begin_preview(&target);
        let (second_seq, second_request) = negotiator.begin_preview(&target);

        let stale = api.respond(&first_request).unwrap();
        assert!(!negotiator.apply_preview(first_seq, stale));
        assert_eq!(negotiator.last_preview(), None);

        let fresh = api.respond(&second_request).unwrap();
        assert!(negotiator.apply_preview(second_seq, fresh));
        assert_eq!(negotiator.last_preview().unwrap().row_count, 40);
    }

    #[tokio::test]
    async fn test_auto_refresh_previews_on_change_only() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");
        let target = tree_target();

        // Auto-refresh off: nothing happens.
        negotiator.mark_changed();
        assert!(!negotiator.maybe_preview(&api, &target).await.unwrap());
        assert_eq!(api.tree_calls.load(Ordering::SeqCst), 0);

        negotiator.set_auto_refresh(true);
        assert!(negotiator.maybe_preview(&api, &target).await.unwrap());
        assert_eq!(api.tree_calls.load(Ordering::SeqCst), 1);

        // Clean state: no re-preview.
        assert!(!negotiator.maybe_preview(&api, &target).await.unwrap());
        assert_eq!(api.tree_calls.load(Ordering::SeqCst), 1);

        // Ceiling escalation counts as a change.
        negotiator.escalate();
        assert!(negotiator.maybe_preview(&api, &target).await.unwrap());
        assert_eq!(api.tree_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bulk_targets_route_to_their_endpoints() {
        let api = FakeExecutor::new(40);
        let mut negotiator = DownloadNegotiator::new("default");

        let bulk = DownloadTarget::tables(vec![TableName::bare("A")], BulkMode::Bulk);
        negotiator.preview(&api, &bulk).await.unwrap();
        assert_eq!(api.bulk_calls.load(Ordering::SeqCst), 1);

        let model = DownloadTarget::tables(vec![TableName::bare("A")], BulkMode::Model);
        negotiator.preview(&api, &model).await.unwrap();
        assert_eq!(api.model_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.tree_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_legacy_query_values_are_stripped_per_request() {
        let mut negotiator = DownloadNegotiator::new("default");
        let mut values = HashMap::new();
        values.insert("id".to_string(), "5".to_string());
        values.insert("status".to_string(), "  ".to_string());
        negotiator.set_query_values(values);
        negotiator.set_dataset("staging");

        let (_, request) = negotiator.begin_preview(&tree_target());
        assert_eq!(request.dataset, "staging");
        // The blank entry is stripped from the request, not from the
        // stored state.
        assert_eq!(request.query_values.len(), 1);
        assert_eq!(negotiator.query_values.len(), 2);
    }

    #[tokio::test]
    async fn test_preview_request_prunes_and_strips() {
        let mut root = Dependency::root(TableName::bare("Orders"));
        root.queries = vec![
            crate::engine::queries::Query::new("id", "5"),
            crate::engine::queries::Query::new("status", " "),
        ];
        let tree = root.with_children(vec![Dependency::child(
            TableName::bare("Notes"),
            "FK_Orders_Notes",
            false,
        )]);

        let mut negotiator = DownloadNegotiator::new("default");
        let (_, request) = negotiator.begin_preview(&DownloadTarget::tree(tree));

        let dependency = request.dependency.unwrap();
        // The unselected optional branch is cut and the blank filter
        // stripped at the transmission boundary.
        assert_eq!(dependency.sub_dependencies.as_ref().unwrap().len(), 0);
        assert_eq!(dependency.queries.len(), 1);
        assert!(request.dry_run);
        assert_eq!(request.max_rows, DEFAULT_MAX_ROWS);
    }
}
