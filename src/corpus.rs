use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    npy,
};

/// One photograph's metadata.
///
/// Only `ocr` is interpreted; every other field from the metadata file
/// (image URL, publication date, publisher, ...) is kept verbatim in
/// `fields` for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Position of this record in the corpus. Assigned on load.
    #[serde(skip_deserializing)]
    pub uuid: usize,
    #[serde(default)]
    pub ocr: String,
    /// Lowercased `ocr`, the text keyword bootstrapping matches against.
    #[serde(skip_deserializing)]
    pub lowered_ocr: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(ocr: impl Into<String>) -> Self {
        Self {
            uuid: 0,
            ocr: ocr.into(),
            lowered_ocr: String::new(),
            fields: Map::new(),
        }
    }

    /// Attach a presentation field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Row-major embedding matrix backed by a single contiguous buffer.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    rows: usize,
    dimension: usize,
    /// `data[row * dimension + dim_idx]`
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(rows: usize, dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be non-zero".into(),
            ));
        }
        if rows.checked_mul(dimension) != Some(data.len()) {
            return Err(Error::Config(format!(
                "embedding buffer has {} values, expected {rows} x {dimension}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            dimension,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get the embedding vector for one row.
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Copy the given rows, in order, into a new contiguous buffer.
    pub fn gather(&self, indices: &[usize]) -> Vec<f32> {
        let mut out = Vec::with_capacity(indices.len() * self.dimension);
        for &idx in indices {
            out.extend_from_slice(self.row(idx));
        }
        out
    }
}

/// Records paired with their embeddings. Immutable once built.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<Record>,
    embeddings: EmbeddingMatrix,
}

impl Corpus {
    /// Pair records with embeddings, assigning each record its `uuid` and
    /// normalized OCR text.
    ///
    /// # Examples
    ///
    /// ```
    /// use facetlearn::corpus::{Corpus, EmbeddingMatrix, Record};
    ///
    /// let records = vec![Record::new("A Horse"), Record::new("a boxer")];
    /// let embeddings = EmbeddingMatrix::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    /// let corpus = Corpus::new(records, embeddings).unwrap();
    ///
    /// assert_eq!(corpus.records()[1].uuid, 1);
    /// assert_eq!(corpus.records()[0].lowered_ocr, "a horse");
    /// ```
    pub fn new(
        mut records: Vec<Record>,
        embeddings: EmbeddingMatrix,
    ) -> Result<Self> {
        if records.len() != embeddings.rows() {
            return Err(Error::CorpusAlignment {
                records: records.len(),
                embeddings: embeddings.rows(),
            });
        }

        for (i, record) in records.iter_mut().enumerate() {
            record.uuid = i;
            record.lowered_ocr = record.ocr.to_lowercase();
            // Derived fields are recomputed, never taken from the file.
            record.fields.remove("uuid");
            record.fields.remove("lowered_ocr");
        }

        Ok(Self {
            records,
            embeddings,
        })
    }

    /// Load a corpus from a metadata JSON array and an `.npy` embedding
    /// matrix.
    pub fn load(metadata_path: &Path, embeddings_path: &Path) -> Result<Self> {
        let file = std::fs::File::open(metadata_path)?;
        let records: Vec<Record> =
            serde_json::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(count = records.len(), "loaded metadata");

        let (rows, dimension, data) = npy::read_f32(embeddings_path)?;
        tracing::info!(rows, dimension, "loaded embeddings");

        let embeddings = EmbeddingMatrix::new(rows, dimension, data)?;
        Self::new(records, embeddings)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, uuid: usize) -> Option<&Record> {
        self.records.get(uuid)
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.dimension()
    }
}
