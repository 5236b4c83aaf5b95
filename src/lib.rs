pub mod classifier;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod engine;
pub mod keywords;
pub mod llm;
pub mod references;
pub mod scorer;
pub mod segmenter;

pub use classifier::Classification;
pub use config::TutorConfig;
pub use engine::{CourseIndex, TutorEngine, TutorResponse};
