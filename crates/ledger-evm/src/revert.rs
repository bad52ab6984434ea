//! Maps revert-reason text from settlement dry-runs onto the error classes
//! the engine acts on. Reason strings vary across ledger deployments, so
//! matching is substring-based over a known pattern table.

use synth_keeper_core::RevertClass;

const INVALID_INDEX: &[&str] = &[
    "invalid index",
    "index out of bounds",
    "out-of-bounds",
    "no position at index",
    "bad index",
    "invalid position",
    "position does not exist",
];

const ALREADY_CLOSED: &[&str] = &[
    "already closed",
    "already settled",
    "position closed",
    "position not open",
    "not open",
];

const NOT_TRIGGERED: &[&str] = &[
    "not triggered",
    "condition not met",
    "condition not yet met",
    "price not reached",
    "cannot settle yet",
    "threshold not crossed",
];

const UNAUTHORIZED: &[&str] = &[
    "unauthorized",
    "not authorized",
    "not allowed",
    "only keeper",
    "caller is not",
];

fn matches_any(reason: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| reason.contains(p))
}

/// Classifies a decoded revert reason string.
#[must_use]
pub fn classify_reason(reason: &str) -> RevertClass {
    let lowered = reason.to_lowercase();
    if matches_any(&lowered, INVALID_INDEX) {
        RevertClass::InvalidIndex
    } else if matches_any(&lowered, ALREADY_CLOSED) {
        RevertClass::AlreadyClosed
    } else if matches_any(&lowered, NOT_TRIGGERED) {
        RevertClass::NotTriggered
    } else if matches_any(&lowered, UNAUTHORIZED) {
        RevertClass::Unauthorized
    } else {
        RevertClass::Other(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reasons_classify() {
        assert_eq!(classify_reason("Ledger: invalid index"), RevertClass::InvalidIndex);
        assert_eq!(
            classify_reason("Position does not exist"),
            RevertClass::InvalidIndex
        );
        assert_eq!(classify_reason("position NOT OPEN"), RevertClass::AlreadyClosed);
        assert_eq!(
            classify_reason("TP/SL condition not met"),
            RevertClass::NotTriggered
        );
        assert_eq!(classify_reason("caller is not keeper"), RevertClass::Unauthorized);
    }

    #[test]
    fn unknown_reason_keeps_text() {
        match classify_reason("margin below maintenance") {
            RevertClass::Other(reason) => assert_eq!(reason, "margin below maintenance"),
            other => panic!("expected Other, got {other:?}"),
        }
    }
}
