//! The directory generated files live in.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub const OUTPUT_EXTENSION: &str = ".wav";

#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// A fresh `<uuid-v4>.wav` path inside the directory
    pub fn new_file_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}", Uuid::new_v4(), OUTPUT_EXTENSION))
    }

    /// Names of the `.wav` entries, in directory order. A missing directory
    /// lists as empty.
    pub fn list(&self) -> std::io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str()
                && name.ends_with(OUTPUT_EXTENSION)
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Path of `name` inside the directory, if `name` is a single plain
    /// path component.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.contains(['/', '\\']) {
            return None;
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Some(self.dir.join(name)),
            _ => None,
        }
    }
}
