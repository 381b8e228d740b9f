//! Change detection over successive slot listings.
//!
//! A listing is reduced to a [`Fingerprint`] built from each slot's label and
//! price summary in source order, so reordering counts as a change while raw
//! fields that never reach a notification do not.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::slot::Slot;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Leading characters, for logs and status replies.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    FirstSeen,
    Unchanged,
    Changed,
}

pub fn fingerprint(slots: &[Slot]) -> Fingerprint {
    let mut hasher = Sha256::new();
    for slot in slots {
        hasher.update(slot.label().as_bytes());
        hasher.update(slot.price_summary().as_bytes());
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// `previous` is `None` until the first successful cycle stores a fingerprint.
pub fn classify(previous: Option<&Fingerprint>, current: &Fingerprint) -> ChangeKind {
    match previous {
        None => ChangeKind::FirstSeen,
        Some(previous) if previous == current => ChangeKind::Unchanged,
        Some(_) => ChangeKind::Changed,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, fingerprint, ChangeKind};
    use crate::domain::slot::{Slot, SlotFields};

    fn slot(hall: &str, eat_discount: &str) -> Slot {
        Slot::try_from(SlotFields {
            wedding_date: Some("20250607".to_owned()),
            weekday: Some("토".to_owned()),
            time: Some("12:00".to_owned()),
            hall_name: Some(hall.to_owned()),
            rent_discount: Some("1000000".to_owned()),
            eat_discount: Some(eat_discount.to_owned()),
            per_discount: Some("200".to_owned()),
            hall_image_code: Some("H01".to_owned()),
            ..SlotFields::default()
        })
        .expect("valid slot")
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let slots = vec![slot("A", "12000000"), slot("B", "14000000")];
        assert_eq!(fingerprint(&slots), fingerprint(&slots.clone()));
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let slots = vec![slot("A", "12000000"), slot("B", "14000000")];
        let reversed: Vec<_> = slots.iter().rev().cloned().collect();
        assert_ne!(fingerprint(&slots), fingerprint(&reversed));
    }

    #[test]
    fn fingerprint_ignores_fields_outside_label_and_price() {
        let plain = slot("A", "12000000");
        let mut fields = plain.fields().clone();
        fields.promotion_text = Some("early bird".to_owned());
        fields.total_amount = Some("999".to_owned());
        let decorated = Slot::try_from(fields).expect("valid slot");

        assert_eq!(fingerprint(&[plain]), fingerprint(&[decorated]));
    }

    #[test]
    fn fingerprint_tracks_price_changes() {
        assert_ne!(fingerprint(&[slot("A", "12000000")]), fingerprint(&[slot("A", "13000000")]));
    }

    #[test]
    fn classify_reports_first_seen_unchanged_and_changed() {
        let one = fingerprint(&[slot("A", "12000000")]);
        let two = fingerprint(&[slot("A", "12000000"), slot("B", "14000000")]);

        assert_eq!(classify(None, &one), ChangeKind::FirstSeen);
        assert_eq!(classify(Some(&one), &one.clone()), ChangeKind::Unchanged);
        assert_eq!(classify(Some(&one), &two), ChangeKind::Changed);
    }

    #[test]
    fn empty_listing_is_first_seen_before_any_fingerprint_is_stored() {
        let empty = fingerprint(&[]);
        assert_eq!(classify(None, &empty), ChangeKind::FirstSeen);
        assert_eq!(empty.short().len(), 12);
    }
}
