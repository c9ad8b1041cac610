//! Query projection use-case service.
//!
//! # Responsibility
//! - Open, recompute, feed and close live projections over the store.
//! - Answer snapshot count/sum/fetch queries.
//! - Stage record writes and fan them out to every open projection of the
//!   written kind.
//!
//! # Invariants
//! - The service is the single owner of its projections; every mutating
//!   call takes `&mut self`.
//! - A store failure leaves every projection unchanged: events are applied
//!   only after the store accepted the write.
//! - Closed handles are never reused and receive no further events.

use crate::model::query::{FetchRequest, Filter, QueryValidationError};
use crate::model::record::{Record, RecordId};
use crate::projection::event::{ChangeEvent, ChangeKind};
use crate::projection::layout::ProjectionLayout;
use crate::projection::subscriber::ProjectionSubscriber;
use crate::repo::record_repo::{RecordRepository, RepoError};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type QueryResult<T> = Result<T, QueryError>;

/// Opaque identifier of one open projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectionHandle(u64);

impl Display for ProjectionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "projection#{}", self.0)
    }
}

#[derive(Debug)]
pub enum QueryError {
    /// Handle was never opened or is already closed.
    UnknownProjection(ProjectionHandle),
    InvalidQuery(QueryValidationError),
    Repo(RepoError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProjection(handle) => write!(f, "unknown {handle}"),
            Self::InvalidQuery(err) => write!(f, "invalid query: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownProjection(_) => None,
            Self::InvalidQuery(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<QueryValidationError> for QueryError {
    fn from(value: QueryValidationError) -> Self {
        Self::InvalidQuery(value)
    }
}

struct OpenProjection {
    layout: ProjectionLayout,
    subscriber: Box<dyn ProjectionSubscriber>,
}

impl OpenProjection {
    fn apply(&mut self, record: &Record, change: ChangeKind) -> Vec<ChangeEvent> {
        let events = self.layout.apply(record, change);
        if events.is_empty() {
            return events;
        }
        self.subscriber.will_change_content();
        for event in &events {
            self.subscriber.did_change(event);
        }
        self.subscriber.did_change_content();
        events
    }

    fn reload(&mut self, records: Vec<Record>) {
        self.layout = ProjectionLayout::build(self.layout.request().clone(), records);
        self.subscriber.did_reload(&self.layout);
    }
}

/// Service facade over one record repository and its open projections.
pub struct QueryService<R: RecordRepository> {
    repo: R,
    projections: BTreeMap<ProjectionHandle, OpenProjection>,
    next_handle: u64,
}

impl<R: RecordRepository> QueryService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            projections: BTreeMap::new(),
            next_handle: 1,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Opens a live projection with an initial full scan.
    ///
    /// # Errors
    /// - `InvalidQuery` when the request does not validate.
    /// - `Repo(StorageUnavailable)` when the scan fails; nothing is opened.
    pub fn open(
        &mut self,
        request: FetchRequest,
        subscriber: Box<dyn ProjectionSubscriber>,
    ) -> QueryResult<ProjectionHandle> {
        request.validate()?;
        let started_at = Instant::now();
        let records = self.scan_logged("projection_open", &request)?;
        let layout = ProjectionLayout::build(request, records);

        let handle = ProjectionHandle(self.next_handle);
        self.next_handle += 1;
        info!(
            "event=projection_open module=query status=ok handle={} kind={} sections={} rows={} duration_ms={}",
            handle.0,
            layout.request().kind,
            layout.sections().len(),
            layout.len(),
            started_at.elapsed().as_millis()
        );
        self.projections
            .insert(handle, OpenProjection { layout, subscriber });
        Ok(handle)
    }

    /// Replaces the layout of `handle` with a fresh full scan.
    ///
    /// The subscriber gets one reload notification and no per-row events.
    pub fn recompute(&mut self, handle: ProjectionHandle) -> QueryResult<()> {
        let request = self.layout(handle)?.request().clone();
        let started_at = Instant::now();
        let records = self.scan_logged("projection_recompute", &request)?;
        let projection = self
            .projections
            .get_mut(&handle)
            .ok_or(QueryError::UnknownProjection(handle))?;
        projection.reload(records);
        info!(
            "event=projection_recompute module=query status=ok handle={} rows={} duration_ms={}",
            handle.0,
            projection.layout.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Incorporates one record change into `handle` without rescanning.
    ///
    /// Returns the events delivered to the subscriber, in order.
    pub fn notify_mutation(
        &mut self,
        handle: ProjectionHandle,
        record: &Record,
        change: ChangeKind,
    ) -> QueryResult<Vec<ChangeEvent>> {
        let projection = self
            .projections
            .get_mut(&handle)
            .ok_or(QueryError::UnknownProjection(handle))?;
        Ok(projection.apply(record, change))
    }

    /// Releases the projection; the handle becomes unknown.
    pub fn close(&mut self, handle: ProjectionHandle) -> QueryResult<()> {
        self.projections
            .remove(&handle)
            .ok_or(QueryError::UnknownProjection(handle))?;
        info!(
            "event=projection_close module=query status=ok handle={}",
            handle.0
        );
        Ok(())
    }

    pub fn layout(&self, handle: ProjectionHandle) -> QueryResult<&ProjectionLayout> {
        self.projections
            .get(&handle)
            .map(|projection| &projection.layout)
            .ok_or(QueryError::UnknownProjection(handle))
    }

    pub fn open_projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Counts matching records. An empty match is `0`, never an error.
    pub fn count(&self, kind: &str, filter: &Filter) -> QueryResult<u64> {
        filter.validate()?;
        Ok(self.repo.count(kind, filter)?)
    }

    /// Sums a numeric field over matching records. An empty match is `0.0`.
    pub fn sum(&self, kind: &str, filter: &Filter, field: &str) -> QueryResult<f64> {
        filter.validate()?;
        Ok(self.repo.sum(kind, filter, field)?)
    }

    /// Snapshot fetch in projection order (section, sort key, identity).
    pub fn fetch(&self, request: &FetchRequest) -> QueryResult<Vec<Record>> {
        request.validate()?;
        let mut records = self.repo.scan(&request.kind, &request.filter)?;
        records.sort_by(|left, right| request.compare_records(left, right));
        Ok(records)
    }

    /// First matching record by identity order, if any.
    pub fn first_match(&self, kind: &str, filter: &Filter) -> QueryResult<Option<Record>> {
        filter.validate()?;
        Ok(self.repo.scan(kind, filter)?.into_iter().next())
    }

    pub fn get_record(&self, id: RecordId) -> QueryResult<Option<Record>> {
        Ok(self.repo.get_record(id)?)
    }

    /// Stages an insert and feeds it to open projections of the same kind.
    pub fn insert_record(&mut self, record: Record) -> QueryResult<RecordId> {
        let id = self.repo.insert_record(&record)?;
        self.broadcast(&record, ChangeKind::Insert);
        Ok(id)
    }

    /// Stages an update. Returns `false` when the identity is not stored.
    pub fn update_record(&mut self, record: Record) -> QueryResult<bool> {
        match self.repo.update_record(&record) {
            Ok(()) => {
                self.broadcast(&record, ChangeKind::Update);
                Ok(true)
            }
            Err(RepoError::NotFound(id)) => {
                warn!("event=record_update module=query status=skipped reason=not_found id={id}");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stages a delete. Returns `false` when the identity is not stored.
    pub fn delete_record(&mut self, id: RecordId) -> QueryResult<bool> {
        let Some(record) = self.repo.get_record(id)? else {
            warn!("event=record_delete module=query status=skipped reason=not_found id={id}");
            return Ok(false);
        };
        self.repo.delete_record(id)?;
        self.broadcast(&record, ChangeKind::Delete);
        Ok(true)
    }

    pub fn has_staged_changes(&self) -> bool {
        self.repo.has_staged_changes()
    }

    /// Makes staged writes durable. No-op when nothing is staged.
    pub fn flush(&mut self) -> QueryResult<()> {
        if let Err(err) = self.repo.flush() {
            error!("event=store_flush module=query status=error error={err}");
            return Err(err.into());
        }
        Ok(())
    }

    /// Drops staged writes and reloads every open projection.
    pub fn discard(&mut self) -> QueryResult<()> {
        if !self.repo.has_staged_changes() {
            return Ok(());
        }
        self.repo.discard()?;
        let handles: Vec<ProjectionHandle> = self.projections.keys().copied().collect();
        for handle in handles {
            self.recompute(handle)?;
        }
        Ok(())
    }

    /// Recomputes every open projection over `kind`.
    pub fn reload_kind(&mut self, kind: &str) -> QueryResult<()> {
        let handles: Vec<ProjectionHandle> = self
            .projections
            .iter()
            .filter(|(_, projection)| projection.layout.request().kind == kind)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in handles {
            self.recompute(handle)?;
        }
        Ok(())
    }

    fn broadcast(&mut self, record: &Record, change: ChangeKind) {
        for projection in self.projections.values_mut() {
            projection.apply(record, change);
        }
    }

    fn scan_logged(&self, event: &str, request: &FetchRequest) -> QueryResult<Vec<Record>> {
        self.repo
            .scan(&request.kind, &request.filter)
            .map_err(|err| {
                error!(
                    "event={} module=query status=error kind={} error={}",
                    event, request.kind, err
                );
                err.into()
            })
    }
}
