use super::store::SearchHit;

/// Prefixed to answers generated without any accepted evidence.
pub const NO_EVIDENCE_ADVISORY: &str = "Note: No highly relevant documents were found for this query. Response is generated without retrieved context.";

#[derive(Debug, Clone, Copy, Default)]
pub struct CitationComposer;

impl CitationComposer {
    pub fn new() -> Self {
        Self
    }

    /// Label for the `position`-th (1-based) accepted hit.
    pub fn source_label(hit: &SearchHit, position: usize) -> String {
        hit.item
            .source()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Doc {position}"))
    }

    /// `[i] Source: {label} (distance={d:.2})`, `i` matching the prompt marker.
    pub fn citation_line(hit: &SearchHit, position: usize) -> String {
        format!(
            "[{}] Source: {} (distance={:.2})",
            position,
            Self::source_label(hit, position),
            hit.distance()
        )
    }

    pub fn compose(&self, raw_output: &str, accepted: &[SearchHit], had_no_evidence: bool) -> String {
        if had_no_evidence || accepted.is_empty() {
            return format!("{NO_EVIDENCE_ADVISORY}\n\n{raw_output}");
        }

        let citations: Vec<String> = accepted
            .iter()
            .enumerate()
            .map(|(i, hit)| Self::citation_line(hit, i + 1))
            .collect();

        format!("{}\n\n{}", raw_output, citations.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::{EvidenceId, EvidenceItem, Metadata};

    fn hit(source: Option<&str>, score: f32) -> SearchHit {
        let mut metadata = Metadata::new();
        if let Some(source) = source {
            metadata.insert("source".to_string(), source.to_string());
        }
        SearchHit {
            item: EvidenceItem {
                id: EvidenceId::new(0),
                text: "evidence".to_string(),
                metadata,
                vector: vec![],
            },
            score,
        }
    }

    #[test]
    fn appends_one_citation_per_hit_in_order() {
        let accepted = vec![hit(Some("nvd.json"), 0.88), hit(None, 0.5)];
        let response = CitationComposer::new().compose("Patch it.", &accepted, false);
        assert_eq!(
            response,
            "Patch it.\n\n[1] Source: nvd.json (distance=0.12)\n[2] Source: Doc 2 (distance=0.50)"
        );
    }

    #[test]
    fn no_evidence_prepends_advisory() {
        let response = CitationComposer::new().compose("Best guess.", &[], true);
        assert_eq!(response, format!("{NO_EVIDENCE_ADVISORY}\n\nBest guess."));
        assert!(!response.contains("Source:"));
    }

    #[test]
    fn distance_is_rendered_not_similarity() {
        let response = CitationComposer::new().compose("a", &[hit(Some("s"), 0.9)], false);
        assert!(response.ends_with("(distance=0.10)"));
    }
}
