//! Run-scoped artifact layout on the local filesystem.
//!
//! ```text
//! <output_dir>/<run_id>/
//!     product_image.<ext>
//!     avatar_variants/variant_<i>.png
//!     avatar_selected.png
//!     scenes/scene_<n>/storyboard.png
//!     scenes/scene_<n>/video_variants/attempt_<k>/variant_<i>.mp4
//!     scenes/scene_<n>/selected_video.mp4
//!     scenes/scene_<n>/last_frame.png
//!     final/commercial.mp4
//! ```
//!
//! Job records carry `/output/<relative>` URL paths; [`RunStorage::resolve`]
//! maps them back to files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::providers::ReferenceAsset;

static RE_SCENE_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^scene_(\d+)$").unwrap());

const URL_PREFIX: &str = "/output/";
const PRODUCT_IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "webp"];

/// A scene's chosen clip found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedClip {
    pub scene_number: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunStorage {
    base_dir: PathBuf,
}

impl RunStorage {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id)
    }

    pub fn path(&self, run_id: &str, subdir: &str, filename: &str) -> PathBuf {
        let dir = self.run_dir(run_id);
        if subdir.is_empty() {
            dir.join(filename)
        } else {
            dir.join(subdir).join(filename)
        }
    }

    pub fn scene_dir(scene_number: u32) -> String {
        format!("scenes/scene_{}", scene_number)
    }

    pub async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })
    }

    /// Writes `data` under the run, creating directories as needed.
    pub async fn save_bytes(
        &self,
        run_id: &str,
        subdir: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.path(run_id, subdir, filename);
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent).await?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Copies an existing file into the run.
    pub async fn copy_into(
        &self,
        source: &Path,
        run_id: &str,
        subdir: &str,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        let dest = self.path(run_id, subdir, filename);
        if let Some(parent) = dest.parent() {
            self.ensure_dir(parent).await?;
        }
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| StorageError::CopyFile {
                from: source.to_path_buf(),
                to: dest.clone(),
                source: e,
            })?;
        Ok(dest)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_path_buf())
            } else {
                StorageError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    /// Reads a file (URL path or filesystem path) as a model reference.
    pub async fn load_asset(&self, path_or_url: &str) -> Result<ReferenceAsset, StorageError> {
        let path = self.resolve(path_or_url);
        let bytes = self.read(&path).await?;
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        Ok(ReferenceAsset::new(bytes, mime.essence_str()))
    }

    pub fn find_product_image(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        PRODUCT_IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.path(run_id, "", &format!("product_image.{}", ext)))
            .find(|p| p.exists())
            .ok_or_else(|| StorageError::MissingProductImage(run_id.to_string()))
    }

    /// `/output/<relative>` for paths under the base dir; other paths are
    /// returned unchanged.
    pub fn to_url_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.base_dir) {
            Ok(relative) => {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                format!("{}{}", URL_PREFIX, parts.join("/"))
            }
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    /// Inverse of [`RunStorage::to_url_path`].
    pub fn resolve(&self, path_or_url: &str) -> PathBuf {
        match path_or_url.strip_prefix(URL_PREFIX) {
            Some(relative) => self.base_dir.join(relative),
            None => PathBuf::from(path_or_url),
        }
    }

    /// `scenes/scene_<n>/selected_video.mp4` files of a run, ordered by n.
    /// Scene directories without a clip are skipped with a warning.
    pub fn selected_clips(&self, run_id: &str) -> Result<Vec<SelectedClip>, StorageError> {
        let scenes_dir = self.run_dir(run_id).join("scenes");
        if !scenes_dir.is_dir() {
            return Err(StorageError::NotFound(scenes_dir));
        }

        let mut clips = Vec::new();
        for entry in WalkDir::new(&scenes_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StorageError::ScanFailed {
                path: scenes_dir.clone(),
                source: e,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let Some(scene_number) = RE_SCENE_DIR
                .captures(&name)
                .and_then(|c| c[1].parse::<u32>().ok())
            else {
                continue;
            };

            let clip = entry.path().join("selected_video.mp4");
            if clip.is_file() {
                clips.push(SelectedClip {
                    scene_number,
                    path: clip,
                });
            } else {
                log::warn!("Missing selected_video.mp4 in {}", entry.path().display());
            }
        }

        clips.sort_by_key(|c| c.scene_number);
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, RunStorage) {
        let dir = TempDir::new().unwrap();
        let storage = RunStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_save_and_load_asset() {
        let (_dir, storage) = storage();
        let path = storage
            .save_bytes("run1", "avatar_variants", "variant_0.png", b"png-bytes")
            .await
            .unwrap();
        assert!(path.ends_with("run1/avatar_variants/variant_0.png"));

        let url = storage.to_url_path(&path);
        assert_eq!(url, "/output/run1/avatar_variants/variant_0.png");

        let asset = storage.load_asset(&url).await.unwrap();
        assert_eq!(asset.bytes, b"png-bytes");
        assert_eq!(asset.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_load_missing_asset_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.load_asset("/output/run1/nope.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_product_image_any_extension() {
        let (_dir, storage) = storage();
        assert!(storage.find_product_image("run1").is_err());
        storage
            .save_bytes("run1", "", "product_image.webp", b"webp")
            .await
            .unwrap();
        assert!(storage
            .find_product_image("run1")
            .unwrap()
            .ends_with("product_image.webp"));
    }

    #[tokio::test]
    async fn test_selected_clips_sorted_numerically() {
        let (_dir, storage) = storage();
        for n in [10, 2, 1] {
            storage
                .save_bytes(
                    "run1",
                    &RunStorage::scene_dir(n),
                    "selected_video.mp4",
                    b"mp4",
                )
                .await
                .unwrap();
        }
        storage
            .save_bytes("run1", "scenes/scene_3", "storyboard.png", b"png")
            .await
            .unwrap();
        storage
            .save_bytes("run1", "scenes/notes", "readme.txt", b"x")
            .await
            .unwrap();

        let clips = storage.selected_clips("run1").unwrap();
        let numbers: Vec<u32> = clips.iter().map(|c| c.scene_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
    }

    #[test]
    fn test_resolve_passes_plain_paths_through() {
        let storage = RunStorage::new("/srv/out");
        assert_eq!(
            storage.resolve("/output/r/final/commercial.mp4"),
            PathBuf::from("/srv/out/r/final/commercial.mp4")
        );
        assert_eq!(storage.resolve("/tmp/x.mp4"), PathBuf::from("/tmp/x.mp4"));
        assert_eq!(storage.to_url_path(Path::new("/tmp/x.mp4")), "/tmp/x.mp4");
    }
}
