//! Section-level merge of a correction into the prior document.

use conform_core::Document;

/// Result of merging a correction.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub document: Document,

    /// Flagged sections that were actually replaced, in flagged order.
    pub replaced: Vec<String>,
}

/// Replace each flagged section with its corrected version.
///
/// Sections that were not flagged are copied from `prior` untouched, even if
/// the correction rewrote them. A flagged section the correction omitted
/// keeps its prior value. The result is built fresh, so `prior` is never
/// left half-merged.
pub fn merge_flagged(prior: &Document, corrected: &Document, flagged: &[String]) -> MergeOutcome {
    let mut sections = prior.as_map().clone();
    let mut replaced = Vec::new();

    for name in flagged {
        match corrected.section(name) {
            Some(value) if !value.is_null() => {
                sections.insert(name.clone(), value.clone());
                replaced.push(name.clone());
            }
            _ => {
                tracing::debug!(section = %name, "Correction omitted flagged section; keeping prior");
            }
        }
    }

    MergeOutcome {
        document: Document::from(sections),
        replaced,
    }
}
