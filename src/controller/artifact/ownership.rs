//! # Ownership
//!
//! The managed-by label decides whether an existing Secret is ours to
//! delete. The check looks at the object alone: no I/O, no side effects.

use super::PersistedObject;
use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use std::collections::BTreeMap;

/// True iff the object carries the managed-by label with our sentinel value
#[must_use]
pub fn is_managed(obj: &PersistedObject) -> bool {
    obj.labels
        .get(MANAGED_BY_LABEL)
        .is_some_and(|value| value == MANAGED_BY_VALUE)
}

/// The label set that [`is_managed`] recognises
#[must_use]
pub fn managed_by_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// Label selector matching every object we manage
#[must_use]
pub fn managed_by_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}
