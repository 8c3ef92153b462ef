// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deep merge and name-keyed dedup.
//!
//! Scalars take the incoming value only when it carries content; lists
//! become an ordered set union with existing items first; records merge
//! field by field. The same rule reconciles in-crawl duplicates and a fresh
//! crawl record against a stored company.

use crate::model::ScrapedRecord;
use std::collections::HashMap;
use tracing::warn;

/// Field-wise merge of `incoming` into `self`.
pub trait DeepMerge {
    fn merge_from(&mut self, incoming: Self);

    /// True when the value carries no content and must not overwrite.
    fn is_blank(&self) -> bool {
        false
    }
}

impl DeepMerge for String {
    fn merge_from(&mut self, incoming: Self) {
        if !incoming.is_blank() {
            *self = incoming;
        }
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T: DeepMerge> DeepMerge for Option<T> {
    fn merge_from(&mut self, incoming: Self) {
        let Some(incoming) = incoming else {
            return;
        };
        match self {
            Some(existing) => existing.merge_from(incoming),
            None if !incoming.is_blank() => *self = Some(incoming),
            None => {}
        }
    }

    fn is_blank(&self) -> bool {
        self.as_ref().map_or(true, DeepMerge::is_blank)
    }
}

impl<T: PartialEq> DeepMerge for Vec<T> {
    fn merge_from(&mut self, incoming: Self) {
        let existing = std::mem::take(self);
        for item in existing.into_iter().chain(incoming) {
            if !self.contains(&item) {
                self.push(item);
            }
        }
    }

    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// Implement [`DeepMerge`] for a struct by merging the listed fields.
#[macro_export]
macro_rules! impl_deep_merge {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::merge::DeepMerge for $ty {
            fn merge_from(&mut self, incoming: Self) {
                $( $crate::merge::DeepMerge::merge_from(&mut self.$field, incoming.$field); )+
            }

            fn is_blank(&self) -> bool {
                true $( && $crate::merge::DeepMerge::is_blank(&self.$field) )+
            }
        }
    };
}

/// Merge two values, returning the result.
pub fn merged<T: DeepMerge>(mut existing: T, incoming: T) -> T {
    existing.merge_from(incoming);
    existing
}

/// Group records by trimmed name and fold each group left to right.
///
/// Groups come out in first-seen order. Nameless records are dropped.
pub fn dedup_by_name(records: Vec<ScrapedRecord>) -> Vec<ScrapedRecord> {
    let mut order: Vec<ScrapedRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut record in records {
        let key = record.name.trim().to_string();
        if key.is_empty() {
            warn!(source = ?record.source, "dropping record without a name");
            continue;
        }
        record.name = key.clone();
        match index.get(&key) {
            Some(&slot) => order[slot].merge_from(record),
            None => {
                index.insert(key, order.len());
                order.push(record);
            }
        }
    }

    order
}
