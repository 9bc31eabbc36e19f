//! Fragment de-duplication.
//!
//! Set semantics: the output holds each distinct input string exactly once.
//! The order returned is first occurrence, which keeps output stable between
//! runs, but callers must not rely on it.

use std::collections::HashSet;

use crate::models::ExtractedRecord;

pub fn dedup(list: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(list.len());
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// De-duplicate every fragment list of `record`.
pub fn dedup_record(record: ExtractedRecord) -> ExtractedRecord {
    ExtractedRecord {
        id: record.id,
        emails: dedup(record.emails),
        ips: dedup(record.ips),
        domains: dedup(record.domains),
        phonenumbers: dedup(record.phonenumbers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_removes_duplicates() {
        let out = dedup(strings(&["a@b.io", "c@d.io", "a@b.io", "a@b.io"]));
        assert_eq!(out, strings(&["a@b.io", "c@d.io"]));
    }

    #[test]
    fn test_empty() {
        assert!(dedup(Vec::new()).is_empty());
    }

    #[test]
    fn test_record_lists_are_independent() {
        let record = ExtractedRecord {
            id: "r1".to_string(),
            emails: strings(&["x@y.zz", "x@y.zz"]),
            ips: strings(&["1.1.1.1"]),
            domains: strings(&["y.zz", "y.zz", "q.zz"]),
            phonenumbers: Vec::new(),
        };

        let out = dedup_record(record);

        assert_eq!(out.id, "r1");
        assert_eq!(out.emails, strings(&["x@y.zz"]));
        assert_eq!(out.ips, strings(&["1.1.1.1"]));
        assert_eq!(out.domains, strings(&["y.zz", "q.zz"]));
    }

    proptest! {
        #[test]
        fn prop_dedup_is_idempotent(list in proptest::collection::vec("[a-c]{0,2}", 0..40)) {
            let once = dedup(list);
            let twice = dedup(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_dedup_keeps_set_membership(list in proptest::collection::vec("[a-d]{1,3}", 0..40)) {
            let out = dedup(list.clone());
            let out_set: BTreeSet<&String> = out.iter().collect();
            let in_set: BTreeSet<&String> = list.iter().collect();
            prop_assert_eq!(out_set.len(), out.len());
            prop_assert_eq!(out_set, in_set);
        }
    }
}
