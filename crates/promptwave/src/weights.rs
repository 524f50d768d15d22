use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const TOKENIZER_FILE: &str = "spiece.model";

/// Local paths of everything needed to build a MusicGen model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Resolve model files from a local directory or a HuggingFace repo id.
    ///
    /// An existing directory wins; anything else is treated as a repo id
    /// (e.g. `facebook/musicgen-small`) and downloaded into the HF cache.
    pub fn resolve(model: &str, revision: Option<&str>) -> Result<Self> {
        let dir = Path::new(model);
        if dir.is_dir() {
            return Self::from_dir(dir);
        }

        let fetch = |file: &str| {
            let uri = match revision {
                Some(rev) => format!("hf://{}/{}@{}", model, file, rev),
                None => format!("hf://{}/{}", model, file),
            };
            tracing::debug!("fetching {}", uri);
            download_if_necessary(&uri)
                .with_context(|| format!("Failed to download {} from '{}'", file, model))
        };

        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            weights: fetch(WEIGHTS_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
        })
    }

    /// Use files from a local checkpoint directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let files = Self {
            config: dir.join(CONFIG_FILE),
            weights: dir.join(WEIGHTS_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
        };
        for path in [&files.config, &files.weights, &files.tokenizer] {
            if !path.exists() {
                anyhow::bail!("Model file {:?} not found in {:?}", path, dir);
            }
        }
        Ok(files)
    }
}

/// Use ApiBuilder to support HF_TOKEN from environment
fn hf_api() -> Result<Api> {
    let token = std::env::var("HF_TOKEN").ok();
    Ok(ApiBuilder::new().with_token(token).build()?)
}

/// Download a file from HuggingFace Hub if necessary.
///
/// Supports the format: `hf://owner/repo/filename@revision`
/// where `@revision` is optional. Other paths are returned unchanged.
pub fn download_if_necessary(file_path: &str) -> Result<PathBuf> {
    match parse_hf_path(file_path)? {
        Some(hf) => {
            let repo = match hf.revision {
                Some(rev) => Repo::with_revision(hf.repo_id, RepoType::Model, rev),
                None => Repo::model(hf.repo_id),
            };
            let path = hf_api()?.repo(repo).get(&hf.filename)?;
            Ok(path)
        }
        None => Ok(PathBuf::from(file_path)),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct HfPath {
    repo_id: String,
    filename: String,
    revision: Option<String>,
}

fn parse_hf_path(file_path: &str) -> Result<Option<HfPath>> {
    let Some(path) = file_path.strip_prefix("hf://") else {
        return Ok(None);
    };
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 3 {
        anyhow::bail!(
            "Invalid hf:// path: {}. Expected hf://repo_owner/repo_name/filename[@revision]",
            file_path
        );
    }
    let repo_id = format!("{}/{}", parts[0], parts[1]);
    let filename_with_revision = parts[2..].join("/");

    let (filename, revision) = match filename_with_revision.rsplit_once('@') {
        Some((f, r)) => (f.to_string(), Some(r.to_string())),
        None => (filename_with_revision, None),
    };

    Ok(Some(HfPath {
        repo_id,
        filename,
        revision,
    }))
}
