use crate::model::{Classification, ResultStatus, TestCase};

/// Declination language commonly emitted by aligned chat models.
pub(crate) const REFUSAL_MARKERS: &[&str] = &[
    "i cannot",
    "i can't",
    "i can not",
    "i won't",
    "i will not",
    "i am sorry",
    "i'm sorry",
    "i am unable",
    "i'm unable",
    "i must decline",
    "as an ai",
    "against my guidelines",
];

/// Explicit safety-block markers, distinct from polite refusal wording.
pub(crate) const POLICY_MARKERS: &[&str] = &[
    "content policy",
    "content_filter",
    "content filter",
    "safety policy",
    "[blocked",
    "request has been blocked",
    "violates our policies",
    "flagged by our safety system",
];

/// Maps one terminal execution outcome to the failure taxonomy.
///
/// Pure and deterministic: identical `(response, status, case)` input always
/// yields the same label. Precedence when several signals match, highest
/// first: crash, policy_violation, refusal, incorrect_output, success.
/// Any non-success status (including cancelled) lands in the crash bucket,
/// since no usable response exists to inspect.
pub fn classify(
    response: Option<&str>,
    status: ResultStatus,
    case: &TestCase,
) -> Classification {
    let text = match (status, response) {
        (ResultStatus::Success, Some(t)) => t,
        _ => return Classification::Crash,
    };

    let lower = text.to_lowercase();
    if POLICY_MARKERS.iter().any(|m| lower.contains(m)) {
        return Classification::PolicyViolation;
    }
    if REFUSAL_MARKERS.iter().any(|m| lower.contains(m)) {
        return Classification::Refusal;
    }
    if let Some(expected) = case.expected_behavior.as_deref() {
        if !expected.is_empty() && !lower.contains(&expected.to_lowercase()) {
            return Classification::IncorrectOutput;
        }
    }
    Classification::Success
}
