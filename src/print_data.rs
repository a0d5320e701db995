// src/print_data.rs - Staged slice bundles on the filesystem
use crate::config::PrintFileSettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("override table error: {0}")]
    Csv(#[from] csv::Error),
    #[error("print settings error: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("nothing to stage in the download directory")]
    NothingToStage,
    #[error("bundle has no layers")]
    Empty,
    #[error("missing slice image for layer {0}")]
    MissingSlice(u32),
}

/// Manages the slice bundle a print runs from: a directory of
/// `slice_N.png` images plus optional `printsettings.json` and `layers.csv`
/// files. Incoming bundles land in the download directory, are staged and
/// validated, and only then replace the active data.
#[derive(Debug, Clone)]
pub struct PrintData {
    data_dir: PathBuf,
    staging_dir: PathBuf,
    download_dir: PathBuf,
}

impl PrintData {
    pub fn new(data_dir: &Path, staging_dir: &Path, download_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            staging_dir: staging_dir.to_path_buf(),
            download_dir: download_dir.to_path_buf(),
        }
    }

    /// Number of printable layers in the active bundle; zero when no bundle
    /// is loaded.
    pub fn layer_count(&self) -> u32 {
        count_slices(&self.data_dir)
    }

    pub fn has_data(&self) -> bool {
        self.layer_count() >= 1
    }

    pub fn layer_image_path(&self, layer: u32) -> PathBuf {
        self.data_dir.join(format!("slice_{layer}.png"))
    }

    /// Move the downloaded bundle into the staging area, replacing whatever
    /// was staged before.
    pub fn stage(&self) -> Result<(), PrintDataError> {
        let incoming = first_entry(&self.download_dir)?.ok_or(PrintDataError::NothingToStage)?;
        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        if let Some(parent) = self.staging_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        if incoming.is_dir() {
            fs::rename(&incoming, &self.staging_dir)?;
        } else {
            fs::create_dir_all(&self.staging_dir)?;
            let name = incoming.file_name().expect("entry has a name");
            fs::rename(&incoming, self.staging_dir.join(name))?;
        }
        tracing::info!("staged print data from {}", incoming.display());
        Ok(())
    }

    /// Check the staged bundle is printable: at least one slice, numbered
    /// contiguously from 1.
    pub fn validate(&self) -> Result<(), PrintDataError> {
        let count = count_slices(&self.staging_dir);
        if count == 0 {
            return Err(PrintDataError::Empty);
        }
        for layer in 1..=count {
            let slice = self.staging_dir.join(format!("slice_{layer}.png"));
            if !slice.exists() {
                return Err(PrintDataError::MissingSlice(layer));
            }
        }
        Ok(())
    }

    /// Per-print settings from the staged bundle, if it carries any.
    pub fn staged_settings(&self) -> Result<Option<PrintFileSettings>, PrintDataError> {
        let path = self.staging_dir.join("printsettings.json");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(load_settings_file(&path)?))
    }

    /// Remove the active bundle. Succeeds when there was nothing to remove.
    pub fn clear(&self) -> Result<(), PrintDataError> {
        if self.data_dir.exists() {
            fs::remove_dir_all(&self.data_dir)?;
        }
        Ok(())
    }

    /// Promote the staged bundle to be the active one. The caller clears the
    /// old data first, so a leftover active directory here is an error.
    pub fn promote(&self) -> Result<(), PrintDataError> {
        if let Some(parent) = self.data_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.staging_dir, &self.data_dir)?;
        Ok(())
    }

    /// Per-layer override table from the active bundle, or an empty table.
    pub fn overrides(&self) -> Result<LayerOverrides, PrintDataError> {
        let path = self.data_dir.join("layers.csv");
        if !path.exists() {
            return Ok(LayerOverrides::default());
        }
        LayerOverrides::load(&path)
    }

    /// Job name recorded in the staged settings, for error reporting.
    pub fn staged_job_name(&self) -> String {
        self.staged_settings()
            .ok()
            .flatten()
            .and_then(|s| s.job_name)
            .unwrap_or_default()
    }
}

/// Load a per-print settings file (JSON) from an arbitrary path.
pub fn load_settings_file(path: &Path) -> Result<PrintFileSettings, PrintDataError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// One row of the optional `layers.csv` override table. Absent cells leave
/// the profile value in force.
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideRow {
    pub layer: u32,
    pub thickness_microns: Option<i32>,
    pub exposure_sec: Option<f64>,
    pub rotation_millidegrees: Option<i32>,
    pub z_lift_microns: Option<i32>,
}

#[derive(Debug, Default)]
pub struct LayerOverrides {
    rows: HashMap<u32, OverrideRow>,
}

impl LayerOverrides {
    pub fn load(path: &Path) -> Result<Self, PrintDataError> {
        let mut rows = HashMap::new();
        let mut reader = csv::Reader::from_path(path)?;
        for row in reader.deserialize() {
            let row: OverrideRow = row?;
            rows.insert(row.layer, row);
        }
        Ok(Self { rows })
    }

    pub fn insert(&mut self, row: OverrideRow) {
        self.rows.insert(row.layer, row);
    }

    pub fn row(&self, layer: u32) -> Option<&OverrideRow> {
        self.rows.get(&layer)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn count_slices(dir: &Path) -> u32 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with("slice_") && name.ends_with(".png"))
                .unwrap_or(false)
        })
        .count() as u32
}

fn first_entry(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(None);
    };
    Ok(entries.flatten().map(|e| e.path()).next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_slices(dir: &Path, count: u32) {
        fs::create_dir_all(dir).unwrap();
        for layer in 1..=count {
            fs::File::create(dir.join(format!("slice_{layer}.png"))).unwrap();
        }
    }

    fn manager(root: &Path) -> PrintData {
        PrintData::new(
            &root.join("data"),
            &root.join("staging"),
            &root.join("download"),
        )
    }

    #[test]
    fn layer_count_ignores_unrelated_files() {
        let root = tempdir().unwrap();
        let data = manager(root.path());
        write_slices(&root.path().join("data"), 3);
        fs::File::create(root.path().join("data/layers.csv")).unwrap();
        assert_eq!(data.layer_count(), 3);
        assert!(data.has_data());
    }

    #[test]
    fn empty_or_missing_directory_has_no_data() {
        let root = tempdir().unwrap();
        let data = manager(root.path());
        assert_eq!(data.layer_count(), 0);
        assert!(!data.has_data());
    }

    #[test]
    fn stage_validate_promote_pipeline() {
        let root = tempdir().unwrap();
        let data = manager(root.path());
        let bundle = root.path().join("download/job1");
        write_slices(&bundle, 2);

        data.stage().unwrap();
        data.validate().unwrap();
        data.clear().unwrap();
        data.promote().unwrap();
        assert_eq!(data.layer_count(), 2);
        assert!(data.layer_image_path(2).exists());
        // the download directory has been drained
        assert!(data.stage().is_err());
    }

    #[test]
    fn validation_rejects_a_gap_in_the_slices() {
        let root = tempdir().unwrap();
        let data = manager(root.path());
        let staging = root.path().join("staging");
        write_slices(&staging, 3);
        fs::remove_file(staging.join("slice_2.png")).unwrap();
        match data.validate() {
            Err(PrintDataError::MissingSlice(2)) => {}
            other => panic!("expected MissingSlice(2), got {other:?}"),
        }
    }

    #[test]
    fn staged_settings_round_trip() {
        let root = tempdir().unwrap();
        let data = manager(root.path());
        let staging = root.path().join("staging");
        write_slices(&staging, 1);
        let mut file = fs::File::create(staging.join("printsettings.json")).unwrap();
        write!(
            file,
            r#"{{"model_exposure_sec": 1.25, "job_name": "bracket"}}"#
        )
        .unwrap();

        let settings = data.staged_settings().unwrap().unwrap();
        assert_eq!(settings.model_exposure_sec, Some(1.25));
        assert_eq!(data.staged_job_name(), "bracket");
    }

    #[test]
    fn override_table_loads_sparse_rows() {
        let root = tempdir().unwrap();
        let path = root.path().join("layers.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "layer,thickness_microns,exposure_sec,rotation_millidegrees,z_lift_microns"
        )
        .unwrap();
        writeln!(file, "2,50,,,").unwrap();
        writeln!(file, "5,,3.5,30000,").unwrap();

        let overrides = LayerOverrides::load(&path).unwrap();
        assert_eq!(overrides.row(2).unwrap().thickness_microns, Some(50));
        assert_eq!(overrides.row(2).unwrap().exposure_sec, None);
        assert_eq!(overrides.row(5).unwrap().exposure_sec, Some(3.5));
        assert!(overrides.row(1).is_none());
    }
}
