use rayon::prelude::*;

use crate::corpus::Corpus;

/// Find the weak-label positives for a keyword.
///
/// Returns, in corpus order, the uuid of every record whose lowercased OCR
/// text contains the lowercased query as a plain substring. There is no
/// tokenization and no trimming, so `" boxer "` only matches where the
/// word is surrounded by spaces. An empty query matches every record.
///
/// Because the query is lowercased too, a query with uppercase letters
/// (`"CAT"`) matches here, while a raw comparison against the lowercased
/// text would find nothing. Lowercase queries behave identically either way.
///
/// # Examples
///
/// ```
/// use facetlearn::{bootstrap, corpus::{Corpus, EmbeddingMatrix, Record}};
///
/// let records = vec![Record::new("A cat"), Record::new("a dog"), Record::new("Concatenate")];
/// let corpus = Corpus::new(records, EmbeddingMatrix::new(3, 1, vec![0.0; 3]).unwrap()).unwrap();
///
/// assert_eq!(bootstrap::keyword_search(&corpus, "cat"), vec![0, 2]);
/// assert_eq!(bootstrap::keyword_search(&corpus, " cat"), vec![0]);
/// assert_eq!(bootstrap::keyword_search(&corpus, ""), vec![0, 1, 2]);
/// ```
pub fn keyword_search(corpus: &Corpus, query: &str) -> Vec<usize> {
    if query.is_empty() {
        return (0..corpus.len()).collect();
    }

    let needle = query.to_lowercase();
    corpus
        .records()
        .par_iter()
        .filter(|r| r.lowered_ocr.contains(&needle))
        .map(|r| r.uuid)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::corpus::{EmbeddingMatrix, Record};

    fn corpus_of(texts: &[&str]) -> Corpus {
        let records = texts.iter().map(|t| Record::new(*t)).collect();
        let embeddings =
            EmbeddingMatrix::new(texts.len(), 1, vec![0.0; texts.len()])
                .unwrap();
        Corpus::new(records, embeddings).unwrap()
    }

    #[test]
    fn matches_substrings() {
        let corpus = corpus_of(&[
            "a cat",
            "a dog",
            "a cat and dog",
            "no match",
            "cat again",
        ]);
        assert_eq!(keyword_search(&corpus, "cat"), vec![0, 2, 4]);
        assert_eq!(keyword_search(&corpus, "dog"), vec![1, 2]);
    }

    #[test]
    fn empty_query_matches_everything() {
        let corpus = corpus_of(&["x", "", "y"]);
        assert_eq!(keyword_search(&corpus, ""), vec![0, 1, 2]);
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let corpus = corpus_of(&["baseball", "football"]);
        assert!(keyword_search(&corpus, "cricket").is_empty());
    }

    #[test]
    fn padding_is_significant() {
        let corpus = corpus_of(&["the boxer", "boxer rebellion", "a boxer here"]);
        assert_eq!(keyword_search(&corpus, "boxer"), vec![0, 1, 2]);
        assert_eq!(keyword_search(&corpus, " boxer "), vec![2]);
    }

    #[test]
    fn padded_query_misses_unpadded_text() {
        let corpus = corpus_of(&["boxer", "boxers"]);
        assert!(keyword_search(&corpus, " boxer ").is_empty());
    }

    #[test]
    fn matching_ignores_case() {
        let corpus = corpus_of(&["BASEBALL Season", "baseball"]);
        assert_eq!(keyword_search(&corpus, "Baseball"), vec![0, 1]);
    }

    #[test]
    fn uppercase_query_matches_lowercased_text() {
        let corpus = corpus_of(&["a cat", "a dog"]);
        assert_eq!(keyword_search(&corpus, "CAT"), vec![0]);
    }

    #[test]
    fn partial_words_match() {
        let corpus = corpus_of(&["horseshoe", "a horse"]);
        assert_eq!(keyword_search(&corpus, "horse"), vec![0, 1]);
    }

    proptest! {
        #[test]
        fn membership_is_substring_containment(
            texts in proptest::collection::vec("[a-c ]{0,8}", 1..20),
            query in "[a-c ]{0,3}",
        ) {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let corpus = corpus_of(&refs);
            let hits = keyword_search(&corpus, &query);

            let expected: Vec<usize> = corpus
                .records()
                .iter()
                .filter(|r| r.lowered_ocr.contains(query.as_str()))
                .map(|r| r.uuid)
                .collect();
            prop_assert_eq!(hits, expected);
        }
    }
}
