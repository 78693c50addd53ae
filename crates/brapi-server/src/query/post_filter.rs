//! Filtering and paging of projected objects
//!
//! Used when some filters cannot be pushed to the store: the store returns
//! every candidate, the candidates are projected, and this module keeps the
//! matches and cuts out the requested page while counting all matches.

use serde_json::Value;

use super::PageRequest;
use crate::storage::{scalar_text, FilterSet, FilterValue};

/// Keep the objects matching every post-filter, returning the requested page
/// and the total number of matches
pub fn apply_and_paginate(
    items: impl IntoIterator<Item = Value>,
    post: &FilterSet,
    page: PageRequest,
) -> (Vec<Value>, u64) {
    apply_and_paginate_by(items, post, page, |item| item)
}

/// [`apply_and_paginate`] over items carrying their object
pub fn apply_and_paginate_by<T>(
    items: impl IntoIterator<Item = T>,
    post: &FilterSet,
    page: PageRequest,
    object: impl Fn(&T) -> &Value,
) -> (Vec<T>, u64) {
    let window = page
        .page_size
        .map(|size| (page.page.saturating_mul(size), page.page.saturating_mul(size).saturating_add(size)));

    let mut total = 0u64;
    let mut selected = Vec::new();
    for item in items {
        if !matches_all(object(&item), post) {
            continue;
        }
        let in_window = match window {
            Some((start, end)) => total >= start && total < end,
            None => true,
        };
        if in_window {
            selected.push(item);
        }
        total += 1;
    }
    (selected, total)
}

/// True when `object` satisfies every filter; a missing or null field fails
pub fn matches_all(object: &Value, post: &FilterSet) -> bool {
    post.iter().all(|(field, filter)| match object.get(field) {
        None | Some(Value::Null) => false,
        Some(value) => matches_value(value, filter),
    })
}

fn matches_value(value: &Value, filter: &FilterValue) -> bool {
    let wanted = filter.candidates();
    match value {
        Value::Array(items) => items.iter().any(|item| wanted.contains(&scalar_text(item))),
        scalar => wanted.contains(&scalar_text(scalar)),
    }
}
