//! facetlearn - discover more photos of an ad-hoc facet from a keyword.
//!
//! A keyword search over OCR text yields weak positive labels; an equal
//! number of random records serve as negatives. A weighted logistic
//! regression trained on the records' precomputed embeddings then scores
//! the whole corpus, and the top-ranked records not already used for
//! training are returned for review.
//!
//! # Quick start
//!
//! ```no_run
//! use facetlearn::{Corpus, DataDir, FacetConfig, FacetSession};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let corpus = Corpus::load(&data_dir.metadata(), &data_dir.embeddings()).unwrap();
//! let config = FacetConfig::load(&data_dir.config()).unwrap();
//!
//! let session = FacetSession::new(&corpus, config);
//! for uuid in session.learn_facet("baseball").unwrap().iter().take(20) {
//!     println!("{uuid}");
//! }
//! ```

pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod data_dir;
pub mod error;
pub mod npy;
pub mod rank;
pub mod sampler;
pub mod session;

pub use config::FacetConfig;
pub use corpus::{Corpus, EmbeddingMatrix, Record};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use rank::ScoredCandidate;
pub use session::{FacetOutcome, FacetSession};
