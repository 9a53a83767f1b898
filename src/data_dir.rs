use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "FACETLEARN_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The FACETLEARN_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/facetlearn/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with_env(explicit, std::env::var_os(DATA_DIR_ENV_VAR))
    }

    /// [`resolve`](Self::resolve) with the environment value passed in.
    fn resolve_with_env(
        explicit: Option<&Path>,
        env_value: Option<OsString>,
    ) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Some(val) = env_value.filter(|v| !v.is_empty()) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("facetlearn")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn embeddings(&self) -> PathBuf {
        self.root.join("embeddings.npy")
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
