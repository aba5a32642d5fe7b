//! Multi-signal similarity scoring between two contact records
//!
//! Weights are fixed policy. The total is a plain sum (max 115) and is never
//! clamped; callers compare it against [`DUPLICATE_THRESHOLD`].

use crate::types::ContactRecord;
use serde::{Deserialize, Serialize};

pub const EXACT_NAME_WEIGHT: u32 = 40;
pub const PARTIAL_NAME_WEIGHT: u32 = 30;
pub const PHONE_WEIGHT: u32 = 35;
pub const EMAIL_WEIGHT: u32 = 25;
pub const ORGANIZATION_WEIGHT: u32 = 15;

/// Minimum score for a pair to count as a candidate duplicate
pub const DUPLICATE_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ExactName,
    SimilarName,
    Phone,
    Email,
    Organization,
}

impl SignalKind {
    /// Human-readable reason shown next to a duplicate suggestion
    pub fn reason(&self) -> &'static str {
        match self {
            SignalKind::ExactName => "Exact name match",
            SignalKind::SimilarName => "Similar names",
            SignalKind::Phone => "Matching phone numbers",
            SignalKind::Email => "Matching email addresses",
            SignalKind::Organization => "Same organization",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub value: u32,
    pub signals: Vec<Signal>,
}

impl SimilarityScore {
    pub fn is_candidate(&self) -> bool {
        self.value >= DUPLICATE_THRESHOLD
    }

    pub fn reasons(&self) -> Vec<String> {
        self.signals
            .iter()
            .map(|s| s.kind.reason().to_string())
            .collect()
    }
}

/// Score how likely it is that `a` and `b` describe the same person.
pub fn score(a: &ContactRecord, b: &ContactRecord) -> SimilarityScore {
    let mut signals = Vec::new();

    if let Some(kind) = name_signal(&a.name, &b.name) {
        let weight = match kind {
            SignalKind::ExactName => EXACT_NAME_WEIGHT,
            _ => PARTIAL_NAME_WEIGHT,
        };
        signals.push(Signal { kind, weight });
    }

    if phones_overlap(&a.normalized_phones(), &b.normalized_phones()) {
        signals.push(Signal {
            kind: SignalKind::Phone,
            weight: PHONE_WEIGHT,
        });
    }

    if emails_overlap(a, b) {
        signals.push(Signal {
            kind: SignalKind::Email,
            weight: EMAIL_WEIGHT,
        });
    }

    if organizations_match(a.organization.as_deref(), b.organization.as_deref()) {
        signals.push(Signal {
            kind: SignalKind::Organization,
            weight: ORGANIZATION_WEIGHT,
        });
    }

    SimilarityScore {
        value: signals.iter().map(|s| s.weight).sum(),
        signals,
    }
}

fn name_signal(a: &str, b: &str) -> Option<SignalKind> {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        Some(SignalKind::ExactName)
    } else if a.contains(&b) || b.contains(&a) {
        Some(SignalKind::SimilarName)
    } else {
        None
    }
}

/// Digit strings match when equal or when either contains the other
pub fn phones_overlap(a: &[String], b: &[String]) -> bool {
    a.iter().any(|x| {
        b.iter()
            .any(|y| !x.is_empty() && !y.is_empty() && (x.contains(y.as_str()) || y.contains(x.as_str())))
    })
}

/// Case-insensitive exact match of any address on either side
pub fn emails_overlap(a: &ContactRecord, b: &ContactRecord) -> bool {
    let theirs = b.normalized_emails();
    a.normalized_emails().iter().any(|e| theirs.contains(e))
}

fn organizations_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            a.to_lowercase() == b.to_lowercase()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContactDraft;
    use chrono::Utc;

    fn record(id: &str, draft: ContactDraft) -> ContactRecord {
        ContactRecord::from_draft(id.to_string(), draft, Utc::now())
    }

    #[test]
    fn exact_name_and_phone() {
        let a = record("a", ContactDraft::named("Jane Doe").with_phone("555-1234"));
        let b = record("b", ContactDraft::named("jane doe").with_phone("(555) 1234"));
        let s = score(&a, &b);
        assert_eq!(s.value, 75);
        assert!(s.is_candidate());
        assert_eq!(
            s.reasons(),
            vec!["Exact name match".to_string(), "Matching phone numbers".to_string()]
        );
    }

    #[test]
    fn containment_counts_as_similar_name() {
        let a = record("a", ContactDraft::named("Jane"));
        let b = record("b", ContactDraft::named("Jane Doe"));
        let s = score(&a, &b);
        assert_eq!(s.value, PARTIAL_NAME_WEIGHT);
        assert_eq!(s.signals[0].kind, SignalKind::SimilarName);
    }

    #[test]
    fn phone_suffix_containment_matches() {
        let a = record("a", ContactDraft::named("A").with_phone("+1 555 123 4567"));
        let b = record("b", ContactDraft::named("B").with_phone("555-123-4567"));
        assert_eq!(score(&a, &b).value, PHONE_WEIGHT);
    }

    #[test]
    fn blank_phones_never_match() {
        let a = record("a", ContactDraft::named("A").with_phone("ext."));
        let b = record("b", ContactDraft::named("B").with_phone("---"));
        assert_eq!(score(&a, &b).value, 0);
    }

    #[test]
    fn all_signals_sum_unclamped() {
        let draft = ContactDraft::named("Jane Doe")
            .with_phone("5551234")
            .with_email("jane@example.com")
            .with_organization("Acme");
        let a = record("a", draft.clone());
        let b = record("b", draft);
        assert_eq!(score(&a, &b).value, 115);
    }

    #[test]
    fn organization_alone_is_below_threshold() {
        let a = record("a", ContactDraft::named("Alice").with_organization("Acme"));
        let b = record("b", ContactDraft::named("Bob").with_organization("ACME"));
        let s = score(&a, &b);
        assert_eq!(s.value, ORGANIZATION_WEIGHT);
        assert!(!s.is_candidate());
    }

    #[test]
    fn symmetric() {
        let a = record(
            "a",
            ContactDraft::named("Jane").with_phone("5551234").with_email("J@x.com"),
        );
        let b = record(
            "b",
            ContactDraft::named("Jane Doe").with_phone("15551234").with_email("j@x.com"),
        );
        assert_eq!(score(&a, &b).value, score(&b, &a).value);
    }

    #[test]
    fn adding_shared_phone_adds_exactly_phone_weight() {
        let a = record("a", ContactDraft::named("Alice"));
        let b = record("b", ContactDraft::named("Bob"));
        let before = score(&a, &b).value;
        let a2 = record("a", ContactDraft::named("Alice").with_phone("555-0000"));
        let b2 = record("b", ContactDraft::named("Bob").with_phone("5550000"));
        assert_eq!(score(&a2, &b2).value, before + PHONE_WEIGHT);
    }

    #[test]
    fn organization_match_ignores_non_ascii_case() {
        assert!(organizations_match(Some("ÉCOLE Normale"), Some(" école normale ")));
        assert!(!organizations_match(Some("École"), Some("Ecole")));
        assert!(!organizations_match(Some(""), Some("")));
    }
}
