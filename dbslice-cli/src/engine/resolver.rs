//! Dependency tree synchronization with the remote resolver
//!
//! The resolver service is authoritative for tree *shape*; this module owns
//! the client side of the round trip: submitting the current tree, layering
//! client-authoritative state back onto the returned shape, and discarding
//! responses that have been overtaken by a newer request.

use crate::api::transport::SliceApi;

use super::dependency::{Dependency, NodeKey};
use super::error::SliceError;
use super::events::{StatusBus, StatusEvent};
use super::queries::{Query, QueryOverlay};
use super::selection;
use super::table_name::TableName;

/// Client-side holder of the dependency tree and its selection/filter
/// overlay.
///
/// The tree is only ever replaced via full clone-and-swap; a failed or
/// stale round trip leaves the previous tree authoritative.
#[derive(Debug)]
pub struct TreeResolver {
    tree: Option<Dependency>,
    filters: QueryOverlay,
    /// Latest issued request sequence number; a response is applied only if
    /// it still carries this number.
    seq: u64,
    bus: StatusBus,
}

impl TreeResolver {
    pub fn new() -> Self {
        Self {
            tree: None,
            filters: QueryOverlay::new(),
            seq: 0,
            bus: StatusBus::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&StatusEvent) + Send + Sync + 'static) {
        self.bus.subscribe(subscriber);
    }

    pub fn tree(&self) -> Option<&Dependency> {
        self.tree.as_ref()
    }

    /// Start a fresh tree rooted at `table`. Replaces any previous tree
    /// wholesale, drops its filters, and invalidates in-flight requests.
    pub fn set_root(&mut self, table: TableName) {
        self.tree = Some(Dependency::root(table));
        self.filters = QueryOverlay::new();
        self.seq += 1;
    }

    /// Discard the tree entirely (the user navigated away or switched
    /// dataset).
    pub fn clear(&mut self) {
        self.tree = None;
        self.filters = QueryOverlay::new();
        self.seq += 1;
    }

    /// Issue a new round trip: returns the sequence number and the snapshot
    /// of the tree to submit.
    pub fn begin_refresh(&mut self) -> Result<(u64, Dependency), SliceError> {
        let tree = self
            .tree
            .clone()
            .ok_or_else(|| SliceError::Resolver("no root table selected".to_string()))?;
        self.seq += 1;
        self.bus.publish(&StatusEvent::ResolveStarted {
            root: tree.table_name.clone(),
        });
        Ok((self.seq, tree))
    }

    /// Apply a resolver response. Returns `false` (leaving all state
    /// untouched) if a newer request has been issued since `seq`.
    pub fn apply_refresh(&mut self, seq: u64, resolved: Dependency) -> bool {
        if seq != self.seq {
            log::debug!("dropping stale resolver response (seq {} < {})", seq, self.seq);
            self.bus.publish(&StatusEvent::StaleResponseDropped { seq });
            return false;
        }
        let mut next = resolved;
        if let Some(current) = &self.tree {
            next.adopt_state_from(current);
        } else {
            next.enforce_invariants();
        }
        self.filters.apply_to(&mut next);
        self.bus.publish(&StatusEvent::ResolveCompleted {
            nodes: next.node_count(),
        });
        self.tree = Some(next);
        true
    }

    /// Submit the current tree and synchronize with the recomputed shape.
    /// Returns whether the response was applied (a stale response is
    /// silently discarded).
    pub async fn refresh(&mut self, api: &dyn SliceApi) -> Result<bool, SliceError> {
        let (seq, snapshot) = self.begin_refresh()?;
        match api.resolve_dependencies(&snapshot).await {
            Ok(resolved) => Ok(self.apply_refresh(seq, resolved)),
            Err(error) => {
                self.bus.publish(&StatusEvent::Failed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Toggle the node addressed by `key` and, if anything changed,
    /// re-resolve: the reachable shape may depend on what is included, so
    /// every effective selection change is a remote round trip.
    pub async fn toggle(&mut self, api: &dyn SliceApi, key: &NodeKey) -> Result<bool, SliceError> {
        let Some(current) = &self.tree else {
            return Err(SliceError::Resolver("no root table selected".to_string()));
        };

        let mut next = current.clone();
        if !selection::toggle_at(&mut next, key) {
            return Ok(false);
        }
        self.tree = Some(next);
        self.refresh(api).await?;
        Ok(true)
    }

    /// Replace the filter list for one node atomically. Filters never
    /// change reachable shape, so this stays local.
    pub fn set_filters(&mut self, key: NodeKey, queries: Vec<Query>) {
        self.filters.set(key, queries);
        if let Some(current) = &self.tree {
            let mut next = current.clone();
            self.filters.apply_to(&mut next);
            self.tree = Some(next);
        }
    }

    /// Filter summary line for a node, if it has filters.
    pub fn filter_summary(&self, key: &NodeKey) -> Option<String> {
        self.filters.summary_for(key)
    }

    /// Resolve a constraint name to a node key in the current tree.
    pub fn key_for_constraint(&self, constraint_name: &str) -> Option<NodeKey> {
        self.tree
            .as_ref()
            .and_then(|tree| tree.key_for_constraint(constraint_name))
    }
}

impl Default for TreeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{DownloadRequest, DownloadResponse, TableInfo, TableMetadata};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type ResolveFn = Box<dyn Fn(&Dependency) -> Result<Dependency, SliceError> + Send + Sync>;

    struct FakeApi {
        resolve: ResolveFn,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(resolve: impl Fn(&Dependency) -> Result<Dependency, SliceError> + Send + Sync + 'static) -> Self {
            Self {
                resolve: Box::new(resolve),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SliceApi for FakeApi {
        async fn resolve_dependencies(&self, tree: &Dependency) -> Result<Dependency, SliceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.resolve)(tree)
        }

        async fn table_metadata(&self, _table: &TableName) -> Result<TableMetadata, SliceError> {
            unimplemented!("not used by resolver tests")
        }

        async fn download(&self, _request: &DownloadRequest) -> Result<DownloadResponse, SliceError> {
            unimplemented!("not used by resolver tests")
        }

        async fn download_model(
            &self,
            _request: &DownloadRequest,
        ) -> Result<DownloadResponse, SliceError> {
            unimplemented!("not used by resolver tests")
        }

        async fn download_bulk(
            &self,
            _request: &DownloadRequest,
        ) -> Result<DownloadResponse, SliceError> {
            unimplemented!("not used by resolver tests")
        }

        async fn content(&self) -> Result<Vec<TableInfo>, SliceError> {
            unimplemented!("not used by resolver tests")
        }

        async fn datasets(&self) -> Result<Vec<String>, SliceError> {
            unimplemented!("not used by resolver tests")
        }
    }

    fn orders() -> TableName {
        TableName::new(None::<String>, Some("dbo"), "Orders")
    }

    fn customers_key() -> NodeKey {
        (
            TableName::new(None::<String>, Some("dbo"), "Customers"),
            Some("FK_Orders_Customers".to_string()),
        )
    }

    fn notes_key() -> NodeKey {
        (
            TableName::new(None::<String>, Some("dbo"), "Notes"),
            Some("FK_Orders_Notes".to_string()),
        )
    }

    /// Shape the service would compute for the Orders root: a mandatory FK
    /// to Customers and an optional FK to Notes.
    fn resolve_orders(submitted: &Dependency) -> Result<Dependency, SliceError> {
        Ok(Dependency::root(submitted.table_name.clone()).with_children(vec![
            Dependency::child(customers_key().0, "FK_Orders_Customers", true),
            Dependency::child(notes_key().0, "FK_Orders_Notes", false),
        ]))
    }

    #[tokio::test]
    async fn test_refresh_adopts_resolver_shape() {
        let api = FakeApi::new(resolve_orders);
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());

        assert!(resolver.refresh(&api).await.unwrap());

        let tree = resolver.tree().unwrap();
        assert_eq!(tree.node_count(), 3);
        let mut tree = tree.clone();
        assert!(tree.find_mut(&customers_key()).unwrap().selected);
        assert!(!tree.find_mut(&notes_key()).unwrap().selected);
    }

    #[tokio::test]
    async fn test_toggle_triggers_refetch_and_keeps_state_across_reorder() {
        // After the Notes branch joins the submitted tree, the resolver
        // reveals a further descendant and reorders the children.
        let api = FakeApi::new(|submitted: &Dependency| {
            let mut tree = resolve_orders(submitted)?;
            let notes_selected = submitted
                .clone()
                .find_mut(&notes_key())
                .map(|n| n.selected)
                .unwrap_or(false);
            if notes_selected {
                tree = Dependency::root(submitted.table_name.clone()).with_children(vec![
                    Dependency::child(notes_key().0, "FK_Orders_Notes", false).with_children(vec![
                        Dependency::child(TableName::bare("Authors"), "FK_Notes_Authors", false),
                    ]),
                    Dependency::child(customers_key().0, "FK_Orders_Customers", true),
                ]);
            }
            Ok(tree)
        });

        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());
        resolver.refresh(&api).await.unwrap();

        assert!(resolver.toggle(&api, &notes_key()).await.unwrap());
        assert_eq!(api.call_count(), 2);

        let mut tree = resolver.tree().unwrap().clone();
        // The toggled selection survived the reordered refresh by key.
        assert!(tree.find_mut(&notes_key()).unwrap().selected);
        assert_eq!(tree.node_count(), 4);
        // Mandatory state comes from the resolver shape.
        assert!(tree.find_mut(&customers_key()).unwrap().mandatory);
    }

    #[tokio::test]
    async fn test_toggle_mandatory_is_local_no_op() {
        let api = FakeApi::new(resolve_orders);
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());
        resolver.refresh(&api).await.unwrap();
        assert_eq!(api.call_count(), 1);

        assert!(!resolver.toggle(&api, &customers_key()).await.unwrap());
        // No effective change, no round trip.
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_tree_untouched() {
        let api = FakeApi::new(resolve_orders);
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());
        resolver.refresh(&api).await.unwrap();
        let before = resolver.tree().unwrap().clone();

        let failing = FakeApi::new(|_| Err(SliceError::Resolver("boom".to_string())));
        let error = resolver.refresh(&failing).await.unwrap_err();
        assert!(matches!(error, SliceError::Resolver(_)));
        assert_eq!(resolver.tree().unwrap(), &before);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());

        let (first_seq, first_snapshot) = resolver.begin_refresh().unwrap();
        let (second_seq, second_snapshot) = resolver.begin_refresh().unwrap();

        // The older response arrives last-but-one: dropped without applying.
        let stale = resolve_orders(&first_snapshot).unwrap();
        assert!(!resolver.apply_refresh(first_seq, stale));
        assert_eq!(resolver.tree().unwrap().node_count(), 1);

        let fresh = resolve_orders(&second_snapshot).unwrap();
        assert!(resolver.apply_refresh(second_seq, fresh));
        assert_eq!(resolver.tree().unwrap().node_count(), 3);
    }

    #[tokio::test]
    async fn test_filters_survive_refresh() {
        let api = FakeApi::new(resolve_orders);
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());
        resolver.refresh(&api).await.unwrap();

        resolver.set_filters(customers_key(), vec![Query::new("region", "'EU'")]);
        assert_eq!(
            resolver.filter_summary(&customers_key()).as_deref(),
            Some("region = 'EU'")
        );

        resolver.refresh(&api).await.unwrap();
        let mut tree = resolver.tree().unwrap().clone();
        assert_eq!(
            tree.find_mut(&customers_key()).unwrap().queries,
            vec![Query::new("region", "'EU'")]
        );
    }

    #[tokio::test]
    async fn test_set_root_replaces_tree_wholesale() {
        let api = FakeApi::new(resolve_orders);
        let mut resolver = TreeResolver::new();
        resolver.set_root(orders());
        resolver.refresh(&api).await.unwrap();

        resolver.set_root(TableName::bare("Invoices"));
        let tree = resolver.tree().unwrap();
        assert_eq!(tree.table_name, TableName::bare("Invoices"));
        assert_eq!(tree.node_count(), 1);
    }
}
