use std::collections::BTreeMap;

use crate::types::DocId;

/// Ordered field-value index; iteration and range scans follow codepoint order.
///
/// Ids under one key stay sorted, which is insertion order since doc ids are
/// never reused.
pub type VecIndex<K> = BTreeMap<K, Vec<DocId>>;

pub(crate) fn index_insert(index: &mut VecIndex<String>, key: &str, id: DocId) {
    let ids = index.entry(key.to_string()).or_default();
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

pub(crate) fn index_remove(index: &mut VecIndex<String>, key: &str, id: DocId) {
    if let Some(ids) = index.get_mut(key) {
        if let Ok(pos) = ids.binary_search(&id) {
            ids.remove(pos);
        }
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
