//! Retrieval and grounding.
//!
//! - `EvidenceStore`: embeds and stores evidence behind a `VectorBackend`
//! - `RelevanceFilter`: keeps hits within a distance threshold
//! - `PromptAssembler`: renders the generator prompt with numbered evidence
//! - `CitationComposer`: appends citations or the no-evidence advisory
//! - `QueryOrchestrator`: runs one query through all of the above

pub mod citation;
pub mod filter;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod source;
pub mod sqlite;
pub mod store;

pub use citation::{CitationComposer, NO_EVIDENCE_ADVISORY};
pub use filter::RelevanceFilter;
pub use memory::MemoryBackend;
pub use orchestrator::{
    AcceptedEvidence, OrchestratorConfig, QueryOptions, QueryOrchestrator, QueryResult,
    RetrievedCandidate,
};
pub use prompt::PromptAssembler;
pub use source::{ChunkerConfig, DocumentSource, SourceDocument, TextDirectorySource};
pub use sqlite::SqliteBackend;
pub use store::{EvidenceId, EvidenceItem, EvidenceStore, Metadata, SearchHit, VectorBackend};
