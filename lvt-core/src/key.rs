//! Item identity keys.
//!
//! A range's key slot is found by scanning its item statics for a known
//! attribute prefix. The slot right after the first matching fragment holds
//! the key of every item in that range.

use crate::{ItemRecord, Node};

/// Attribute prefixes in priority order.
pub const KEY_ATTRIBUTE_PRIORITY: [&str; 4] = ["data-lvt-key=\"", "data-key=\"", "key=\"", "id=\""];

/// Used when no statics fragment names a key attribute.
pub const DEFAULT_KEY_SLOT: usize = 0;

pub fn detect_key_slot(statics: &[String]) -> usize {
    detect_key_slot_with(statics, &KEY_ATTRIBUTE_PRIORITY)
}

/// Like [`detect_key_slot`] with a custom attribute priority list.
///
/// The last fragment is never a match: no slot follows it.
pub fn detect_key_slot_with<S: AsRef<str>>(statics: &[String], attributes: &[S]) -> usize {
    let candidates = &statics[..statics.len().saturating_sub(1)];
    attributes
        .iter()
        .find_map(|attribute| {
            candidates
                .iter()
                .position(|fragment| fragment.contains(attribute.as_ref()))
        })
        .unwrap_or(DEFAULT_KEY_SLOT)
}

/// The identity key of an item, if its key slot holds a scalar.
pub fn item_key(item: &ItemRecord, key_slot: usize) -> Option<String> {
    item.get(&key_slot.to_string()).and_then(Node::key_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn statics(fragments: &[&str]) -> Vec<String> {
        fragments.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_default_slot_without_attributes() {
        assert_eq!(detect_key_slot(&statics(&["<li>", "</li>"])), 0);
        assert_eq!(detect_key_slot(&[]), 0);
    }

    #[test]
    fn test_data_key_slot() {
        let s = statics(&["<li class=\"", "\" data-key=\"", "\">", "</li>"]);
        assert_eq!(detect_key_slot(&s), 1);
    }

    #[test]
    fn test_priority_order() {
        // `id="` appears first, but `data-lvt-key="` outranks it.
        let s = statics(&["<tr id=\"", "\" data-lvt-key=\"", "\"><td>", "</td></tr>"]);
        assert_eq!(detect_key_slot(&s), 1);

        let s = statics(&["<tr id=\"", "\" key=\"", "\">", "</tr>"]);
        assert_eq!(detect_key_slot(&s), 1);
    }

    #[test]
    fn test_last_fragment_is_ignored() {
        let s = statics(&["<li>", "</li><span id=\"x\">"]);
        assert_eq!(detect_key_slot(&s), 0);
    }

    #[test]
    fn test_custom_attributes() {
        let s = statics(&["<li>", "<b data-row=\"", "\"></b></li>"]);
        assert_eq!(detect_key_slot_with(&s, &["data-row=\""]), 1);
    }

    #[test]
    fn test_item_key() {
        let item = crate::record_from_map(json!({"0": "a", "1": 5}).as_object().cloned().unwrap());
        assert_eq!(item_key(&item, 0), Some("a".to_string()));
        assert_eq!(item_key(&item, 1), Some("5".to_string()));
        assert_eq!(item_key(&item, 2), None);
    }
}
