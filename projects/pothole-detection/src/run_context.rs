use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunMetadata {
    pub run_id: String,
    pub source: String,
    pub model: String,
    pub conf: f32,
    pub created_at: DateTime<Utc>,
    pub images: usize,
    pub detections: usize,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

/// All images under `root`, sorted by path.
pub fn list_images(root: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| IMAGE_EXTENSIONS.contains(&s.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    images.sort();
    images
}

/// Creates `<project>/<name>`, or `<name>2`, `<name>3`, ... if taken.
pub fn create_run_dir(project: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(anyhow!("Invalid run name: {:?}", name));
    }

    let mut candidate = project.join(name);
    let mut suffix = 2;
    while candidate.exists() {
        candidate = project.join(format!("{}{}", name, suffix));
        suffix += 1;
    }

    fs::create_dir_all(&candidate)
        .with_context(|| format!("Failed to create run directory {}", candidate.display()))?;
    Ok(candidate)
}

impl RunMetadata {
    pub fn new(output_dir: &Path, source: &Path, model: &str, conf: f32) -> Self {
        let run_id = output_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            run_id,
            source: source.to_string_lossy().to_string(),
            model: model.to_string(),
            conf,
            created_at: Utc::now(),
            images: 0,
            detections: 0,
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn save(&self) -> Result<()> {
        let metadata_path = self.output_dir.join("metadata.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(metadata_path, content)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn load(output_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(output_dir.join("metadata.json"))?;
        let mut metadata: RunMetadata = serde_json::from_str(&content)?;
        metadata.output_dir = output_dir.to_path_buf();
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_dirs_are_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        let first = create_run_dir(tmp.path(), "predict").unwrap();
        let second = create_run_dir(tmp.path(), "predict").unwrap();
        let third = create_run_dir(tmp.path(), "predict").unwrap();

        assert_eq!(first, tmp.path().join("predict"));
        assert_eq!(second, tmp.path().join("predict2"));
        assert_eq!(third, tmp.path().join("predict3"));
        assert!(third.is_dir());
    }

    #[test]
    fn test_run_name_must_be_a_single_component() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(create_run_dir(tmp.path(), "").is_err());
        assert!(create_run_dir(tmp.path(), "a/b").is_err());
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.JPG", "a.png", "notes.txt", "labels.csv"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::write(nested.join("c.jpeg"), b"x").unwrap();

        let images = list_images(tmp.path());
        assert_eq!(
            images,
            vec![
                tmp.path().join("a.png"),
                tmp.path().join("b.JPG"),
                nested.join("c.jpeg"),
            ]
        );
    }

    #[test]
    fn test_metadata_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = create_run_dir(tmp.path(), "predict").unwrap();
        let mut metadata = RunMetadata::new(&dir, Path::new("dataset/test/images"), "best.onnx", 0.5);
        metadata.images = 3;
        metadata.detections = 7;
        metadata.save().unwrap();

        let loaded = RunMetadata::load(&dir).unwrap();
        assert_eq!(loaded.run_id, "predict");
        assert_eq!(loaded.images, 3);
        assert_eq!(loaded.detections, 7);
        assert_eq!(loaded.output_dir, dir);
    }
}
