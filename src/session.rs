use std::time::Instant;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    bootstrap,
    classifier::{self, LabelSet, TrainingSet},
    config::FacetConfig,
    corpus::Corpus,
    error::Result,
    rank::{self, ScoredCandidate},
    sampler,
};

/// Everything one facet query produced.
#[derive(Debug, Clone)]
pub struct FacetOutcome {
    pub query: String,
    /// The positives and negatives the classifier was trained on.
    pub labels: LabelSet,
    /// Ranked candidates with training examples removed.
    pub candidates: Vec<ScoredCandidate>,
}

impl FacetOutcome {
    pub fn uuids(&self) -> Vec<usize> {
        self.candidates.iter().map(|c| c.uuid).collect()
    }
}

/// Learns facets over a shared, read-only corpus.
///
/// Holds no mutable state: each query builds, uses and discards its own
/// labels and model.
#[derive(Debug, Clone)]
pub struct FacetSession<'a> {
    corpus: &'a Corpus,
    config: FacetConfig,
}

impl<'a> FacetSession<'a> {
    pub fn new(corpus: &'a Corpus, config: FacetConfig) -> Self {
        Self { corpus, config }
    }

    pub fn config(&self) -> &FacetConfig {
        &self.config
    }

    /// Learn a facet from `query` and return novel candidate uuids, best
    /// first.
    ///
    /// Negative sampling starts from the configured seed on every call, so
    /// repeated queries are reproducible.
    pub fn learn_facet(&self, query: &str) -> Result<Vec<usize>> {
        Ok(self.learn_facet_detailed(query)?.uuids())
    }

    /// Like [`learn_facet`](Self::learn_facet), returning scores and the
    /// training labels as well.
    pub fn learn_facet_detailed(&self, query: &str) -> Result<FacetOutcome> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.learn_facet_with_rng(query, &mut rng)
    }

    /// Run one facet query drawing negatives from `rng`.
    ///
    /// 1. Bootstrap positives from the keyword
    /// 2. Sample as many random negatives
    /// 3. Train the classifier and score the whole corpus
    /// 4. Rank, truncate, and drop training examples
    pub fn learn_facet_with_rng<R: Rng + ?Sized>(
        &self,
        query: &str,
        rng: &mut R,
    ) -> Result<FacetOutcome> {
        let started = Instant::now();

        tracing::info!(query, "finding positive examples");
        let positives = bootstrap::keyword_search(self.corpus, query);
        tracing::info!(count = positives.len(), "found positive matches");

        tracing::info!("generating training data");
        let negatives =
            sampler::sample_negatives(self.corpus.len(), positives.len(), rng);
        let labels = LabelSet::new(positives, negatives);
        let training = TrainingSet::from_labels(
            self.corpus.embeddings(),
            &labels,
            self.config.example_weight,
        )?;

        tracing::info!(rows = training.len(), "training and predicting");
        let model =
            classifier::train(&training, &self.config.train_options())?;
        let scores = model
            .predict_proba(self.corpus.embeddings(), self.config.batch_size)?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scored corpus"
        );

        tracing::info!("sorting and filtering results");
        let candidates =
            rank::rank_and_filter(&scores, &labels, self.config.n_results);
        tracing::info!(
            count = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "done"
        );

        Ok(FacetOutcome {
            query: query.to_string(),
            labels,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::{EmbeddingMatrix, Record},
        error::Error,
    };

    /// Records mentioning "cat" sit near (1, 0), the rest near (0, 1).
    fn pets_corpus() -> Corpus {
        let texts = ["a cat", "a dog", "a cat and dog", "no match", "cat again"];
        let data = vec![
            1.0, 0.1, //
            0.1, 1.0, //
            0.9, 0.3, //
            0.2, 0.8, //
            1.1, 0.0,
        ];
        let records = texts.iter().map(|t| Record::new(*t)).collect();
        Corpus::new(records, EmbeddingMatrix::new(5, 2, data).unwrap()).unwrap()
    }

    #[test]
    fn cat_scenario() {
        let corpus = pets_corpus();
        let session = FacetSession::new(&corpus, FacetConfig::default());
        let outcome = session.learn_facet_detailed("cat").unwrap();

        assert_eq!(outcome.labels.positives(), &[0, 2, 4]);
        assert_eq!(outcome.labels.negatives().len(), 3);
        assert!(outcome.labels.negatives().iter().all(|&i| i < 5));

        let mut expected: Vec<usize> =
            (0..5).filter(|&i| !outcome.labels.contains(i)).collect();
        let mut got = outcome.uuids();
        got.sort_unstable();
        expected.sort_unstable();
        assert_eq!(got, expected);

        for pair in outcome.candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn padded_query_without_matches_is_degenerate() {
        let records = vec![Record::new("boxer"), Record::new("the boxers")];
        let corpus = Corpus::new(
            records,
            EmbeddingMatrix::new(2, 1, vec![0.0, 1.0]).unwrap(),
        )
        .unwrap();
        let session = FacetSession::new(&corpus, FacetConfig::default());

        assert!(matches!(
            session.learn_facet(" boxer "),
            Err(Error::DegenerateTrainingSet {
                positives: 0,
                negatives: 0
            })
        ));
    }

    #[test]
    fn empty_query_trains_on_whole_corpus() {
        let corpus = pets_corpus();
        let session = FacetSession::new(&corpus, FacetConfig::default());
        let outcome = session.learn_facet_detailed("").unwrap();

        assert_eq!(outcome.labels.positives(), &[0, 1, 2, 3, 4]);
        assert_eq!(outcome.labels.negatives().len(), 5);
        // Every record was a training example.
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let corpus = pets_corpus();
        let session = FacetSession::new(&corpus, FacetConfig::default());

        let a = session.learn_facet_detailed("dog").unwrap();
        let b = session.learn_facet_detailed("dog").unwrap();
        assert_eq!(a.labels.negatives(), b.labels.negatives());
        assert_eq!(a.candidates, b.candidates);
    }

    #[test]
    fn caller_rng_drives_negative_sampling() {
        let corpus = pets_corpus();
        let session = FacetSession::new(&corpus, FacetConfig::default());

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let a = session.learn_facet_with_rng("cat", &mut rng_a).unwrap();
        let b = session.learn_facet_with_rng("cat", &mut rng_b).unwrap();
        assert_eq!(a.labels.negatives(), b.labels.negatives());
    }

    #[test]
    fn results_exclude_training_ids() {
        let corpus = pets_corpus();
        let session = FacetSession::new(&corpus, FacetConfig::default());
        let outcome = session.learn_facet_detailed("dog").unwrap();

        for c in &outcome.candidates {
            assert!(!outcome.labels.contains(c.uuid));
        }
    }
}
