//! Materialized, sectioned and sorted layout of one fetch request.
//!
//! # Responsibility
//! - Build the section/row layout from a full scan.
//! - Apply single-record changes incrementally and report the structural
//!   events needed to keep a displayed table in sync.
//!
//! # Invariants
//! - Every member satisfies the request filter; every matching record that
//!   was applied is a member exactly once.
//! - Rows inside a section are strictly ordered by the request sort key
//!   (identity breaks ties).
//! - Sections are ordered by section value and are never empty.
//! - Applying changes one by one yields the same layout as `build` over the
//!   final record set.

use crate::model::query::{FetchRequest, SortKey};
use crate::model::record::{FieldValue, Record, RecordId};
use crate::projection::event::{ChangeEvent, ChangeKind, IndexPath};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One named group of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    value: FieldValue,
    name: String,
    rows: Vec<RecordId>,
}

impl Section {
    fn new(value: FieldValue) -> Self {
        let name = value.to_string();
        Self {
            value,
            name,
            rows: Vec::new(),
        }
    }

    /// Display name derived from the section value. Empty when unsectioned.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn rows(&self) -> &[RecordId] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionLayout {
    request: FetchRequest,
    sections: Vec<Section>,
    members: HashMap<RecordId, Record>,
}

impl ProjectionLayout {
    /// Builds a layout from a full scan of the collection.
    ///
    /// Records of other kinds and records failing the filter are skipped.
    pub fn build(request: FetchRequest, records: impl IntoIterator<Item = Record>) -> Self {
        let mut matching: Vec<Record> = records
            .into_iter()
            .filter(|record| record.kind == request.kind && request.filter.matches(record))
            .collect();
        matching.sort_by(|left, right| request.compare_records(left, right));

        let mut sections: Vec<Section> = Vec::new();
        for record in &matching {
            let value = request.section_value(record);
            let starts_section = sections.last().map_or(true, |last| {
                request.compare_sections(&last.value, &value) != Ordering::Equal
            });
            if starts_section {
                sections.push(Section::new(value));
            }
            if let Some(section) = sections.last_mut() {
                section.rows.push(record.id);
            }
        }

        let members = matching
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        Self {
            request,
            sections,
            members,
        }
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Total number of rows across sections.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.members.contains_key(&id)
    }

    /// Snapshot of a member as last applied.
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.members.get(&id)
    }

    pub fn record_at(&self, path: IndexPath) -> Option<&Record> {
        let id = self.sections.get(path.section)?.rows.get(path.row)?;
        self.members.get(id)
    }

    pub fn index_path_of(&self, id: RecordId) -> Option<IndexPath> {
        let snapshot = self.members.get(&id)?;
        let value = self.request.section_value(snapshot);
        let section = self.find_section(&value).ok()?;
        let rows = &self.sections[section].rows;
        let row = match rows.binary_search_by(|candidate| {
            compare_member(&self.members, &self.request.sort, candidate, snapshot)
        }) {
            Ok(row) => row,
            Err(_) => rows.iter().position(|candidate| *candidate == id)?,
        };
        Some(IndexPath::new(section, row))
    }

    /// Members in display order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.sections
            .iter()
            .flat_map(|section| section.rows.iter())
            .filter_map(|id| self.members.get(id))
    }

    /// Incorporates one record change and returns the events it produced.
    ///
    /// - Records of another kind are ignored.
    /// - Insert of an existing member behaves as update.
    /// - Update of a non-member that now matches inserts it.
    /// - Delete of a non-member is a no-op.
    pub fn apply(&mut self, record: &Record, change: ChangeKind) -> Vec<ChangeEvent> {
        if record.kind != self.request.kind {
            return Vec::new();
        }
        match change {
            ChangeKind::Delete => self.remove_member(record.id),
            ChangeKind::Insert | ChangeKind::Update => self.upsert_member(record),
        }
    }

    fn upsert_member(&mut self, record: &Record) -> Vec<ChangeEvent> {
        let matches = self.request.filter.matches(record);
        match (self.index_path_of(record.id), matches) {
            (None, false) => Vec::new(),
            (None, true) => self.insert_member(record.clone()),
            (Some(_), false) => self.remove_member(record.id),
            (Some(old_path), true) => {
                if self.stays_in_place(old_path, record) {
                    self.members.insert(record.id, record.clone());
                    return vec![ChangeEvent::UpdateRow { path: old_path }];
                }
                let mut events = self.remove_member(record.id);
                events.extend(self.insert_member(record.clone()));
                events
            }
        }
    }

    fn stays_in_place(&self, old_path: IndexPath, record: &Record) -> bool {
        let section = &self.sections[old_path.section];
        let new_value = self.request.section_value(record);
        if self.request.compare_sections(&section.value, &new_value) != Ordering::Equal {
            return false;
        }

        let (before, rest) = section.rows.split_at(old_path.row);
        let after = &rest[1..];
        let sort = &self.request.sort;
        let before_count = row_position(before, &self.members, sort, record);
        let new_row = if before_count < before.len() {
            before_count
        } else {
            before.len() + row_position(after, &self.members, sort, record)
        };
        new_row == old_path.row
    }

    fn insert_member(&mut self, record: Record) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(2);
        let value = self.request.section_value(&record);
        let section_index = match self.find_section(&value) {
            Ok(index) => index,
            Err(index) => {
                self.sections.insert(index, Section::new(value));
                events.push(ChangeEvent::InsertSection { index });
                index
            }
        };

        let rows = &mut self.sections[section_index].rows;
        let row = row_position(rows, &self.members, &self.request.sort, &record);
        rows.insert(row, record.id);
        self.members.insert(record.id, record);
        events.push(ChangeEvent::InsertRow {
            path: IndexPath::new(section_index, row),
        });
        events
    }

    fn remove_member(&mut self, id: RecordId) -> Vec<ChangeEvent> {
        let Some(path) = self.index_path_of(id) else {
            return Vec::new();
        };

        let mut events = vec![ChangeEvent::DeleteRow { path }];
        let section = &mut self.sections[path.section];
        section.rows.remove(path.row);
        if section.rows.is_empty() {
            self.sections.remove(path.section);
            events.push(ChangeEvent::DeleteSection {
                index: path.section,
            });
        }
        self.members.remove(&id);
        events
    }

    fn find_section(&self, value: &FieldValue) -> Result<usize, usize> {
        self.sections
            .binary_search_by(|section| self.request.compare_sections(&section.value, value))
    }
}

fn compare_member(
    members: &HashMap<RecordId, Record>,
    sort: &SortKey,
    probe: &RecordId,
    target: &Record,
) -> Ordering {
    members
        .get(probe)
        .map_or(Ordering::Less, |member| sort.compare(member, target))
}

/// Number of rows ordered strictly before `target`.
fn row_position(
    rows: &[RecordId],
    members: &HashMap<RecordId, Record>,
    sort: &SortKey,
    target: &Record,
) -> usize {
    rows.partition_point(|probe| compare_member(members, sort, probe, target) == Ordering::Less)
}
