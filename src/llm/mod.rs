pub mod hashing;
pub mod openai_compat;
pub mod output;
pub mod provider;
pub mod types;

pub use hashing::HashingEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{Embedder, Generator};
