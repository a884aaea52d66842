//! Shared test session: one element hierarchy, many readers, one writer.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use testplan_core::element::{
    resolve_declared_member, resolve_disposition, resolve_state, source_files,
};
use testplan_core::{
    AttributeClassifier, DeclaredMember, Disposition, Element, ElementId, ElementState,
    ElementTree, IdentityKey, PlanConfig, ProjectRegistry, Result, SourceIndex, TestClassifier,
};
use testplan_tasks::{TaskForest, TaskSequenceBuilder, build_plan};
use testplan_wire::{PlanEnvelope, Record, persist_subtree, restore_records};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::discovery::{AssemblyChange, DiscoveryReport, apply_change};

/// State change of one element during revalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Element whose state changed
    pub element: ElementId,
    /// State before revalidation
    pub from: ElementState,
    /// State after revalidation
    pub to: ElementState,
}

/// Outcome of a revalidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevalidationReport {
    /// Number of elements examined
    pub checked: usize,
    /// Elements whose state changed
    pub transitions: Vec<StateTransition>,
}

/// Test session owning the element hierarchy.
///
/// Mutating passes run one at a time. Each pass works on a private copy of the
/// hierarchy and publishes it in a single swap, so readers observe either the
/// state before a pass or the state after it.
pub struct TestSession {
    elements: RwLock<ElementTree>,
    writer: Mutex<()>,
    config: PlanConfig,
    builder: TaskSequenceBuilder,
    index: Arc<dyn SourceIndex>,
    projects: Arc<dyn ProjectRegistry>,
    classifier: Arc<dyn TestClassifier>,
}

impl TestSession {
    /// Creates a session classifying tests by the configured attributes.
    pub fn new(
        config: PlanConfig,
        index: Arc<dyn SourceIndex>,
        projects: Arc<dyn ProjectRegistry>,
    ) -> Self {
        let classifier = Arc::new(AttributeClassifier::new(config.classifier.clone()));
        Self::with_classifier(config, index, projects, classifier)
    }

    /// Creates a session with a custom classifier.
    pub fn with_classifier(
        config: PlanConfig,
        index: Arc<dyn SourceIndex>,
        projects: Arc<dyn ProjectRegistry>,
        classifier: Arc<dyn TestClassifier>,
    ) -> Self {
        let builder = TaskSequenceBuilder::from_config(&config);
        Self {
            elements: RwLock::new(ElementTree::new()),
            writer: Mutex::new(()),
            config,
            builder,
            index,
            projects,
            classifier,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    /// Applies the exported types of one artifact.
    ///
    /// # Errors
    /// Fails if an element cannot be created; the hierarchy is then unchanged.
    pub async fn discover(&self, change: &AssemblyChange) -> Result<DiscoveryReport> {
        let _pass = self.writer.lock().await;
        info!(
            "Discovery pass for {} ({} exported types)",
            change.assembly_location,
            change.types.len()
        );

        let mut working = self.elements.read().await.clone();
        let report = apply_change(
            &mut working,
            change,
            self.classifier.as_ref(),
            self.config.discovery.prune_unreported,
        )?;
        let total = working.len();
        *self.elements.write().await = working;

        info!(
            "Discovery pass finished: {} reported, {} pruned, {} elements total",
            report.discovered.len(),
            report.pruned.len(),
            total
        );
        Ok(report)
    }

    /// Re-resolves every element against the current source index.
    ///
    /// Elements are judged independently; one element going missing never
    /// affects its siblings.
    ///
    /// # Errors
    /// Returns an error only if the hierarchy is internally inconsistent.
    pub async fn revalidate(&self) -> Result<RevalidationReport> {
        let _pass = self.writer.lock().await;
        let mut working = self.elements.read().await.clone();

        let resolved: Vec<(ElementId, ElementState)> = working
            .iter()
            .map(|element| (element.id().clone(), resolve_state(element, self.index.as_ref())))
            .collect();

        let mut report = RevalidationReport {
            checked: resolved.len(),
            transitions: Vec::new(),
        };
        for (id, state) in resolved {
            let previous = working.set_state(&id, state)?;
            if previous == state {
                continue;
            }
            match state {
                ElementState::Valid => debug!("Element {} is valid again", id),
                ElementState::Invalid => debug!("Element {} no longer qualifies as a test", id),
                ElementState::NotFound => warn!("Element {} no longer exists in source", id),
            }
            report.transitions.push(StateTransition {
                element: id,
                from: previous,
                to: state,
            });
        }

        *self.elements.write().await = working;
        info!(
            "Revalidated {} elements, {} changed state",
            report.checked,
            report.transitions.len()
        );
        Ok(report)
    }

    /// Copy of the current hierarchy.
    pub async fn snapshot(&self) -> ElementTree {
        self.elements.read().await.clone()
    }

    /// Copy of one element.
    pub async fn element(&self, id: &ElementId) -> Option<Element> {
        self.elements.read().await.get(id).cloned()
    }

    /// Id of the element with this identity.
    pub async fn find(&self, identity: &IdentityKey) -> Option<ElementId> {
        self.elements
            .read()
            .await
            .find(identity)
            .map(|element| element.id().clone())
    }

    /// Marks an element as requiring explicit selection, or clears the mark
    /// with an empty reason.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::UnknownElement`] for unknown ids.
    pub async fn set_explicit_reason(&self, id: &ElementId, reason: &str) -> Result<()> {
        let _pass = self.writer.lock().await;
        self.elements.write().await.set_explicit_reason(id, reason)
    }

    /// Declaration sites of an element.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::UnknownElement`] for unknown ids.
    pub async fn disposition(&self, id: &ElementId) -> Result<Disposition> {
        let elements = self.elements.read().await;
        Ok(resolve_disposition(elements.element(id)?, self.index.as_ref()))
    }

    /// Declared method behind a method element.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::UnknownElement`] for unknown ids.
    pub async fn declared_member(&self, id: &ElementId) -> Result<Option<DeclaredMember>> {
        let elements = self.elements.read().await;
        Ok(resolve_declared_member(elements.element(id)?, self.index.as_ref()))
    }

    /// Files declaring an element.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::UnknownElement`] for unknown ids.
    pub async fn source_files(&self, id: &ElementId) -> Result<BTreeSet<PathBuf>> {
        let elements = self.elements.read().await;
        Ok(source_files(elements.element(id)?, self.index.as_ref()))
    }

    /// Builds the merged plan for `selected` against a stable view of the
    /// hierarchy.
    ///
    /// # Errors
    /// See [`build_plan`].
    pub async fn build_plan(
        &self,
        selected: &[ElementId],
        explicit: &[ElementId],
    ) -> Result<TaskForest> {
        let elements = self.elements.read().await;
        build_plan(&elements, selected, explicit, &self.builder)
    }

    /// Builds the merged plan and encodes it for the runner.
    ///
    /// # Errors
    /// See [`build_plan`].
    pub async fn encode_plan(
        &self,
        selected: &[ElementId],
        explicit: &[ElementId],
    ) -> Result<PlanEnvelope> {
        let forest = self.build_plan(selected, explicit).await?;
        Ok(PlanEnvelope::from_forest(self.builder.runner_id(), &forest))
    }

    /// Records for an element and its descendants.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::UnknownElement`] for unknown ids.
    pub async fn persist(&self, root: &ElementId) -> Result<Vec<Record>> {
        let elements = self.elements.read().await;
        persist_subtree(&elements, root)
    }

    /// Records for the whole hierarchy.
    ///
    /// # Errors
    /// Returns an error only if the hierarchy is internally inconsistent.
    pub async fn persist_all(&self) -> Result<Vec<Record>> {
        let elements = self.elements.read().await;
        let mut records = Vec::with_capacity(elements.len());
        for root in elements.roots() {
            records.extend(persist_subtree(&elements, root.id())?);
        }
        Ok(records)
    }

    /// Rebuilds persisted records under `root`, or at the top level when
    /// `root` is `None`. Records of projects that no longer exist are dropped.
    ///
    /// # Errors
    /// Fails on malformed records; the hierarchy is then unchanged.
    pub async fn restore(
        &self,
        records: &[Record],
        root: Option<&ElementId>,
    ) -> Result<Vec<ElementId>> {
        let _pass = self.writer.lock().await;
        let mut working = self.elements.read().await.clone();
        let restored = restore_records(&mut working, records, root, self.projects.as_ref())?;
        *self.elements.write().await = working;
        Ok(restored)
    }
}
