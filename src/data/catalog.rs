// ============================================================
// Layer 4 — Dataset Catalog
// ============================================================
// Where each dataset's label table and preprocessed images live.
//
// Default layout (relative to the working directory):
//
//   inputs/train.csv                                  APTOS labels
//   inputs/diabetic-retinopathy-resized/trainLabels.csv
//   inputs/strMd5.csv                                 duplicate table
//   probs/<name>.csv                                  pseudo labels
//   processed/<dataset>_<img_size>/<id>.<ext>         images
//
// Any part can be overridden from a TOML file, e.g.
//
//   processed_root = "/data/processed"
//   [aptos2019]
//   label_table = "/data/aptos/train.csv"

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::options::SourceDataset;

/// Location and schema of one image source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLayout {
    /// CSV with one row per image
    pub label_table:  PathBuf,
    /// Column holding the image id (the file stem)
    pub id_column:    String,
    /// Column holding the grade
    pub grade_column: String,
    /// Image file extension, without the dot
    pub extension:    String,
    /// Image directory; `None` means `<processed_root>/<key>_<img_size>`
    #[serde(default)]
    pub image_dir:    Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetCatalog {
    pub processed_root:     PathBuf,
    pub aptos2019:          SourceLayout,
    pub diabetic_retinopathy: SourceLayout,
    /// Unlabelled test images that pseudo labels refer to
    pub test:               SourceLayout,
    pub duplicate_table:    PathBuf,
    pub pseudo_label_dir:   PathBuf,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self {
            processed_root: PathBuf::from("processed"),
            aptos2019: SourceLayout {
                label_table:  PathBuf::from("inputs/train.csv"),
                id_column:    "id_code".to_string(),
                grade_column: "diagnosis".to_string(),
                extension:    "png".to_string(),
                image_dir:    None,
            },
            diabetic_retinopathy: SourceLayout {
                label_table:  PathBuf::from("inputs/diabetic-retinopathy-resized/trainLabels.csv"),
                id_column:    "image".to_string(),
                grade_column: "level".to_string(),
                extension:    "jpeg".to_string(),
                image_dir:    None,
            },
            test: SourceLayout {
                label_table:  PathBuf::from("inputs/test.csv"),
                id_column:    "id_code".to_string(),
                grade_column: "diagnosis".to_string(),
                extension:    "png".to_string(),
                image_dir:    None,
            },
            duplicate_table:  PathBuf::from("inputs/strMd5.csv"),
            pseudo_label_dir: PathBuf::from("probs"),
        }
    }
}

impl DatasetCatalog {
    /// Load a catalog from TOML. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read dataset catalog '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Invalid dataset catalog '{}'", path.display()))
    }

    pub fn source(&self, ds: SourceDataset) -> &SourceLayout {
        match ds {
            SourceDataset::Aptos2019           => &self.aptos2019,
            SourceDataset::DiabeticRetinopathy => &self.diabetic_retinopathy,
        }
    }

    /// Directory holding the preprocessed images of `ds`.
    pub fn image_dir(&self, ds: SourceDataset, img_size: u32) -> PathBuf {
        self.resolve_dir(self.source(ds), ds.name(), img_size)
    }

    pub fn test_image_dir(&self, img_size: u32) -> PathBuf {
        self.resolve_dir(&self.test, "test", img_size)
    }

    pub fn pseudo_label_table(&self, name: &str) -> PathBuf {
        self.pseudo_label_dir.join(format!("{name}.csv"))
    }

    fn resolve_dir(&self, layout: &SourceLayout, key: &str, img_size: u32) -> PathBuf {
        layout.image_dir
            .clone()
            .unwrap_or_else(|| self.processed_root.join(format!("{key}_{img_size}")))
    }
}

impl SourceLayout {
    pub fn image_path(&self, dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{id}.{}", self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_dirs() {
        let cat = DatasetCatalog::default();
        assert_eq!(
            cat.image_dir(SourceDataset::Aptos2019, 288),
            PathBuf::from("processed/aptos2019_288")
        );
        assert_eq!(cat.test_image_dir(256), PathBuf::from("processed/test_256"));
        assert_eq!(cat.pseudo_label_table("run7"), PathBuf::from("probs/run7.csv"));
    }

    #[test]
    fn test_partial_toml_override() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        fs::write(
            &path,
            r#"
processed_root = "/data/processed"

[diabetic_retinopathy]
label_table  = "/data/dr/labels.csv"
id_column    = "image"
grade_column = "level"
extension    = "jpeg"
image_dir    = "/data/dr/512"
"#,
        )
        .unwrap();

        let cat = DatasetCatalog::load(&path).unwrap();
        assert_eq!(
            cat.image_dir(SourceDataset::DiabeticRetinopathy, 288),
            PathBuf::from("/data/dr/512")
        );
        assert_eq!(
            cat.image_dir(SourceDataset::Aptos2019, 288),
            PathBuf::from("/data/processed/aptos2019_288")
        );
        assert_eq!(cat.aptos2019.label_table, PathBuf::from("inputs/train.csv"));
    }
}
