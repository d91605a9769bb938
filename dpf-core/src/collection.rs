// MIT License
// Copyright 2023--present dpf-core developers

//! Labelled collections of fields or scopings.
//!
//! Each entry is addressed by a *label space*, a map from label name to an
//! integer, for example `{"time": 1, "body": 12}`. Filters are partial label
//! spaces: an entry matches when its label space contains every pair of the
//! filter.

use std::collections::BTreeMap;

use crate::data::{Field, Scoping};
use crate::error::{Error, Result};

pub type LabelSpace = BTreeMap<String, i32>;

/// Build a label space from `(label, value)` pairs.
pub fn label_space<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> LabelSpace {
    pairs
        .into_iter()
        .map(|(label, value)| (label.to_string(), value))
        .collect()
}

/// Selects one entry of a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum EntrySelector {
    Index(usize),
    Labels(LabelSpace),
}

impl From<usize> for EntrySelector {
    fn from(index: usize) -> Self {
        EntrySelector::Index(index)
    }
}

impl From<LabelSpace> for EntrySelector {
    fn from(labels: LabelSpace) -> Self {
        EntrySelector::Labels(labels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    labels: Vec<String>,
    entries: Vec<(LabelSpace, T)>,
}

pub type FieldsContainer = Collection<Field>;
pub type ScopingsContainer = Collection<Scoping>;

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            entries: Vec::new(),
        }
    }
}

fn matches(space: &LabelSpace, filter: &LabelSpace) -> bool {
    filter.iter().all(|(k, v)| space.get(k) == Some(v))
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        let mut c = Self::new();
        for label in labels {
            c.add_label(label);
        }
        c
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the entry with exactly this label space, or append a new one.
    pub fn add_entry(&mut self, label_space: LabelSpace, entry: T) {
        for label in label_space.keys() {
            self.add_label(label.as_str());
        }
        match self.entries.iter_mut().find(|(ls, _)| *ls == label_space) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((label_space, entry)),
        }
    }

    /// All entries whose label space contains the filter.
    pub fn get_entries(&self, filter: &LabelSpace) -> Vec<&T> {
        self.entries
            .iter()
            .filter(|(ls, _)| matches(ls, filter))
            .map(|(_, e)| e)
            .collect()
    }

    /// Exactly one entry, by index or by label space.
    pub fn get_entry(&self, selector: impl Into<EntrySelector>) -> Result<&T> {
        match selector.into() {
            EntrySelector::Index(i) => self.entries.get(i).map(|(_, e)| e).ok_or_else(|| {
                Error::InvalidData(format!(
                    "collection index {i} out of range (len {})",
                    self.entries.len()
                ))
            }),
            EntrySelector::Labels(filter) => {
                let mut found = self.get_entries(&filter).into_iter();
                match (found.next(), found.next()) {
                    (Some(e), None) => Ok(e),
                    (None, _) => Err(Error::InvalidData(format!(
                        "no entry matches label space {filter:?}"
                    ))),
                    (Some(_), Some(_)) => Err(Error::InvalidData(format!(
                        "several entries match label space {filter:?}"
                    ))),
                }
            }
        }
    }

    pub fn label_space(&self, index: usize) -> Option<&LabelSpace> {
        self.entries.get(index).map(|(ls, _)| ls)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LabelSpace, &T)> {
        self.entries.iter().map(|(ls, e)| (ls, e))
    }
}

impl<T> std::ops::Index<usize> for Collection<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.entries[index].1
    }
}

impl Collection<Field> {
    pub fn get_fields(&self, filter: &LabelSpace) -> Vec<&Field> {
        self.get_entries(filter)
    }

    pub fn get_field(&self, selector: impl Into<EntrySelector>) -> Result<&Field> {
        self.get_entry(selector)
    }

    pub fn add_field(&mut self, label_space: LabelSpace, field: Field) {
        self.add_entry(label_space, field)
    }
}

impl Collection<Scoping> {
    pub fn get_scopings(&self, filter: &LabelSpace) -> Vec<&Scoping> {
        self.get_entries(filter)
    }

    /// Fails when the request selects several scopings.
    pub fn get_scoping(&self, selector: impl Into<EntrySelector>) -> Result<&Scoping> {
        self.get_entry(selector)
    }

    pub fn add_scoping(&mut self, label_space: LabelSpace, scoping: Scoping) {
        self.add_entry(label_space, scoping)
    }
}
