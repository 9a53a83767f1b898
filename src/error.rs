use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A binary classifier needs at least one example of each class.
    #[error(
        "cannot train on a degenerate label set ({positives} positive, {negatives} negative examples)"
    )]
    DegenerateTrainingSet { positives: usize, negatives: usize },

    #[error(
        "corpus is misaligned: {records} records but {embeddings} embedding rows"
    )]
    CorpusAlignment { records: usize, embeddings: usize },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
