//! Downloadable bundle archive.

use super::ArtifactBundle;
use crate::errors::PrdflowError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// File name of the manifest inside the archive.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Digest entry for one archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// File name inside the archive.
    pub name: String,
    /// Size in bytes.
    pub size: usize,
    /// Lowercase hex SHA-256 of the contents.
    pub sha256: String,
}

/// Lists every file in the archive with its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// The run the bundle was built from.
    pub run_id: String,
    /// Product name.
    pub product_name: String,
    /// Files in archive order.
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Builds a manifest for the given files.
    #[must_use]
    pub fn for_files(bundle: &ArtifactBundle, files: &[(String, Vec<u8>)]) -> Self {
        Self {
            run_id: bundle.run_id.to_string(),
            product_name: bundle.product_name.clone(),
            files: files
                .iter()
                .map(|(name, bytes)| ManifestEntry {
                    name: name.clone(),
                    size: bytes.len(),
                    sha256: hex::encode(Sha256::digest(bytes)),
                })
                .collect(),
        }
    }
}

/// Serializes an artifact bundle into a downloadable archive.
pub trait BundleWriter: Send + Sync {
    /// Returns the MIME type of the produced archive.
    fn content_type(&self) -> &'static str;

    /// Returns the file extension of the produced archive, without a dot.
    fn extension(&self) -> &'static str;

    /// Writes the bundle.
    ///
    /// # Errors
    ///
    /// Returns `PrdflowError::Bundle` if the archive cannot be produced.
    fn write(&self, bundle: &ArtifactBundle) -> Result<Vec<u8>, PrdflowError>;
}

/// Writes bundles as zip archives.
///
/// Entries carry a fixed modification time so the archive bytes depend
/// only on the bundle contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipBundleWriter;

impl ZipBundleWriter {
    /// Creates a new writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BundleWriter for ZipBundleWriter {
    fn content_type(&self) -> &'static str {
        "application/zip"
    }

    fn extension(&self) -> &'static str {
        "zip"
    }

    fn write(&self, bundle: &ArtifactBundle) -> Result<Vec<u8>, PrdflowError> {
        let mut files = bundle.files()?;
        let manifest = Manifest::for_files(bundle, &files);
        files.push((MANIFEST_FILE.to_string(), serde_json::to_vec_pretty(&manifest)?));

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in &files {
            zip.start_file(name.as_str(), options)
                .map_err(|e| PrdflowError::Bundle(format!("{name}: {e}")))?;
            zip.write_all(bytes)?;
        }
        let cursor = zip
            .finish()
            .map_err(|e| PrdflowError::Bundle(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}
