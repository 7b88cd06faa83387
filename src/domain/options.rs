// ============================================================
// Layer 3 — Training Options
// ============================================================
// The string-valued "kind" flags of a run, parsed once into
// enums. Parsing accepts the conventional class-style names
// (e.g. "CrossEntropyLoss") as well as snake_case aliases.
// Anything else is a configuration error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

/// Number of retinopathy grades (0..=4).
pub const NUM_GRADES: usize = 5;

fn normalise(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(&['-', ' '][..], "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CrossEntropy,
    Focal,
    Mse,
    Multitask,
}

impl FromStr for LossKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "crossentropyloss" | "cross_entropy" | "ce" => Ok(Self::CrossEntropy),
            "focalloss" | "focal"                       => Ok(Self::Focal),
            "mseloss" | "mse"                           => Ok(Self::Mse),
            "multitask" | "multi_task"                  => Ok(Self::Multitask),
            _ => Err(TrainError::config(format!("unsupported loss kind '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    Classification,
    Regression,
    Multitask,
}

impl PredictionKind {
    /// Width of the model's prediction head.
    pub fn num_outputs(self) -> usize {
        match self {
            Self::Classification => NUM_GRADES,
            Self::Regression     => 1,
            // channel 0 regresses the grade, channels 1.. classify it
            Self::Multitask      => NUM_GRADES + 1,
        }
    }

    /// Check that `loss` can train a head of this kind.
    pub fn check_loss(self, loss: LossKind) -> Result<(), TrainError> {
        let ok = matches!(
            (self, loss),
            (Self::Classification, LossKind::CrossEntropy | LossKind::Focal)
                | (Self::Regression, LossKind::Mse)
                | (Self::Multitask, LossKind::Multitask)
        );
        if ok {
            Ok(())
        } else {
            Err(TrainError::config(format!(
                "loss {loss:?} cannot train a {self:?} head"
            )))
        }
    }
}

impl FromStr for PredictionKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "classification" => Ok(Self::Classification),
            "regression"     => Ok(Self::Regression),
            "multitask" | "multi_task" => Ok(Self::Multitask),
            _ => Err(TrainError::config(format!("unsupported prediction kind '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
    AdamW,
}

impl FromStr for OptimizerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "sgd"   => Ok(Self::Sgd),
            "adam"  => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            _ => Err(TrainError::config(format!("unsupported optimizer '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    CosineAnnealing,
    ReduceOnPlateau,
}

impl FromStr for SchedulerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "cosineannealinglr" | "cosine" | "cosine_annealing" => Ok(Self::CosineAnnealing),
            "reducelronplateau" | "plateau" | "reduce_on_plateau" => Ok(Self::ReduceOnPlateau),
            _ => Err(TrainError::config(format!("unsupported scheduler '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Wgpu,
    Cpu,
}

impl FromStr for DeviceKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "cpu" | "ndarray" => Ok(Self::Cpu),
            _ => Err(TrainError::config(format!("unsupported device '{s}'"))),
        }
    }
}

/// A labelled source of fundus photographs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDataset {
    /// APTOS 2019 blindness detection
    Aptos2019,
    /// Kaggle 2015 diabetic retinopathy detection
    DiabeticRetinopathy,
}

impl SourceDataset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Aptos2019           => "aptos2019",
            Self::DiabeticRetinopathy => "diabetic_retinopathy",
        }
    }
}

impl fmt::Display for SourceDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceDataset {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "aptos2019"            => Ok(Self::Aptos2019),
            "diabetic_retinopathy" => Ok(Self::DiabeticRetinopathy),
            _ => Err(TrainError::config(format!("unknown dataset '{}'", s.trim()))),
        }
    }
}

/// Which datasets a run trains on.
///
/// The primary dataset is split into folds and supplies every
/// validation sample. Secondary sources are appended to the
/// training side of every fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetSelection {
    primary:   SourceDataset,
    secondary: Vec<SourceDataset>,
}

impl DatasetSelection {
    pub fn single(primary: SourceDataset) -> Self {
        Self { primary, secondary: Vec::new() }
    }

    pub fn primary(&self) -> SourceDataset {
        self.primary
    }

    pub fn secondary(&self) -> &[SourceDataset] {
        &self.secondary
    }

    /// Short form used in default run names, e.g. "aptos2019+diabetic_retinopathy".
    pub fn slug(&self) -> String {
        std::iter::once(self.primary)
            .chain(self.secondary.iter().copied())
            .map(SourceDataset::name)
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// APTOS 2019 validated on, the resized Kaggle set mixed into training.
impl Default for DatasetSelection {
    fn default() -> Self {
        Self {
            primary:   SourceDataset::Aptos2019,
            secondary: vec![SourceDataset::DiabeticRetinopathy],
        }
    }
}

impl FromStr for DatasetSelection {
    type Err = TrainError;

    /// APTOS 2019 is the validated dataset whenever it is selected;
    /// otherwise the first name is. Every other name only adds training rows.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selected: Vec<SourceDataset> = Vec::new();
        for name in s.split(',').map(str::trim) {
            if name.is_empty() {
                return Err(TrainError::config(format!("dataset selection '{s}' has an empty name")));
            }
            let ds = name.parse::<SourceDataset>()?;
            if selected.contains(&ds) {
                return Err(TrainError::config(format!("dataset '{ds}' selected twice")));
            }
            selected.push(ds);
        }

        let at = selected.iter().position(|&ds| ds == SourceDataset::Aptos2019).unwrap_or(0);
        let primary = selected.remove(at);
        Ok(Self { primary, secondary: selected })
    }
}

impl TryFrom<String> for DatasetSelection {
    type Error = TrainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DatasetSelection> for String {
    fn from(sel: DatasetSelection) -> Self {
        sel.to_string()
    }
}

impl fmt::Display for DatasetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        for ds in &self.secondary {
            write!(f, ",{ds}")?;
        }
        Ok(())
    }
}
