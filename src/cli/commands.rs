// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `report`
// and all their configurable flags.
//
// "Kind" flags (loss, prediction, optimizer, scheduler,
// architecture, datasets, device) arrive as strings and are
// resolved into enums once, in TryFrom<TrainArgs> for RunConfig.
// An unknown or mismatched kind is a configuration error and the
// process exits before any fold starts.
//
// Boolean toggles take an explicit value: `--rotate false`.

use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{RunConfig, DEFAULT_FOLD_SEED};
use crate::data::augment::AugmentConfig;
use crate::domain::error::TrainError;
use crate::ml::model::Backbone;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one model per fold and write the run's summaries
    Train(TrainArgs),

    /// Print the summary tables of an existing run
    Report(ReportArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Run name; defaults to gcn_<arch>_<datasets>
    #[arg(long)]
    pub name: Option<String>,

    /// Directory holding one sub-directory per run
    #[arg(long, default_value = "models")]
    pub output_dir: PathBuf,

    /// Backbone: cnn_tiny, cnn_small or cnn_base
    #[arg(long, default_value = "cnn_small")]
    pub arch: String,

    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    /// CrossEntropyLoss, FocalLoss, MSELoss or multitask
    #[arg(long, default_value = "CrossEntropyLoss")]
    pub loss: String,

    /// Weight of the regression term of the multitask loss
    #[arg(long, default_value_t = 1.0)]
    pub reg_coef: f64,

    /// Weight of the classification term of the multitask loss
    #[arg(long, default_value_t = 0.1)]
    pub cls_coef: f64,

    /// classification, regression or multitask
    #[arg(long, default_value = "classification")]
    pub pred_type: String,

    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    #[arg(short = 'b', long, default_value_t = 32)]
    pub batch_size: usize,

    /// Side length images are resized to before cropping
    #[arg(long, default_value_t = 288)]
    pub img_size: u32,

    /// Side length of the network input
    #[arg(long, default_value_t = 256)]
    pub input_size: u32,

    /// SGD, Adam or AdamW
    #[arg(long, default_value = "SGD")]
    pub optimizer: String,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 1e-5)]
    pub min_lr: f64,

    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub nesterov: bool,

    /// CosineAnnealingLR or ReduceLROnPlateau
    #[arg(long, default_value = "CosineAnnealingLR")]
    pub scheduler: String,

    /// Plateau reduction factor
    #[arg(long, default_value_t = 0.5)]
    pub factor: f64,

    /// Plateau patience, in epochs
    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub rotate: bool,

    /// Degrees
    #[arg(long, default_value_t = -180.0, allow_negative_numbers = true)]
    pub rotate_min: f64,

    #[arg(long, default_value_t = 180.0)]
    pub rotate_max: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub rescale: bool,

    #[arg(long, default_value_t = 0.8889)]
    pub rescale_min: f64,

    #[arg(long, default_value_t = 1.0)]
    pub rescale_max: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub shear: bool,

    /// Degrees of horizontal shear
    #[arg(long, default_value_t = -36.0, allow_negative_numbers = true)]
    pub shear_min: f64,

    #[arg(long, default_value_t = 36.0)]
    pub shear_max: f64,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub translate: bool,

    /// Largest horizontal shift, as a fraction of the width
    #[arg(long, default_value_t = 0.0)]
    pub translate_min: f64,

    /// Largest vertical shift, as a fraction of the height
    #[arg(long, default_value_t = 0.0)]
    pub translate_max: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub flip: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub contrast: bool,

    #[arg(long, default_value_t = 0.9)]
    pub contrast_min: f64,

    #[arg(long, default_value_t = 1.1)]
    pub contrast_max: f64,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub random_erase: bool,

    #[arg(long, default_value_t = 0.5)]
    pub random_erase_prob: f64,

    #[arg(long, default_value_t = 0.02)]
    pub random_erase_sl: f64,

    #[arg(long, default_value_t = 0.4)]
    pub random_erase_sh: f64,

    #[arg(long, default_value_t = 0.3)]
    pub random_erase_r: f64,

    /// Comma separated; the first is split into folds, the rest only train
    #[arg(long, default_value = "aptos2019,diabetic_retinopathy")]
    pub train_dataset: String,

    /// Train every fold (false: stop after the first)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub cv: bool,

    #[arg(long, default_value_t = 5)]
    pub n_splits: usize,

    /// Seed of the stratified fold assignment
    #[arg(long, default_value_t = DEFAULT_FOLD_SEED)]
    pub fold_seed: u64,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub remove_duplicate: bool,

    /// Prediction table under the pseudo-label directory, without .csv
    #[arg(long)]
    pub pseudo_labels: Option<String>,

    /// Run whose fold weights initialise this run's folds
    #[arg(long)]
    pub pretrained_model: Option<String>,

    /// wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub device: String,

    /// TOML file overriding dataset locations
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

/// Convert CLI TrainArgs into the application-layer RunConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types or kind strings.
impl TryFrom<TrainArgs> for RunConfig {
    type Error = TrainError;

    fn try_from(a: TrainArgs) -> Result<Self, Self::Error> {
        let arch: Backbone = a.arch.parse()?;
        let datasets       = a.train_dataset.parse()?;
        let name = a.name.unwrap_or_else(|| RunConfig::default_name(arch, &datasets));

        let cfg = RunConfig {
            name,
            output_dir:   a.output_dir,
            arch,
            dropout:      a.dropout,
            loss:         a.loss.parse()?,
            reg_coef:     a.reg_coef,
            cls_coef:     a.cls_coef,
            prediction:   a.pred_type.parse()?,
            epochs:       a.epochs,
            batch_size:   a.batch_size,
            img_size:     a.img_size,
            input_size:   a.input_size,
            optimizer:    a.optimizer.parse()?,
            lr:           a.lr,
            min_lr:       a.min_lr,
            momentum:     a.momentum,
            weight_decay: a.weight_decay,
            nesterov:     a.nesterov,
            scheduler:    a.scheduler.parse()?,
            factor:       a.factor,
            patience:     a.patience,
            augment: AugmentConfig {
                rotate:            a.rotate,
                rotate_min:        a.rotate_min,
                rotate_max:        a.rotate_max,
                rescale:           a.rescale,
                rescale_min:       a.rescale_min,
                rescale_max:       a.rescale_max,
                shear:             a.shear,
                shear_min:         a.shear_min,
                shear_max:         a.shear_max,
                translate:         a.translate,
                translate_min:     a.translate_min,
                translate_max:     a.translate_max,
                flip:              a.flip,
                contrast:          a.contrast,
                contrast_min:      a.contrast_min,
                contrast_max:      a.contrast_max,
                random_erase:      a.random_erase,
                random_erase_prob: a.random_erase_prob,
                random_erase_sl:   a.random_erase_sl,
                random_erase_sh:   a.random_erase_sh,
                random_erase_r:    a.random_erase_r,
            },
            datasets,
            cv:                a.cv,
            n_splits:          a.n_splits,
            fold_seed:         a.fold_seed,
            remove_duplicates: a.remove_duplicate,
            pseudo_labels:     a.pseudo_labels,
            pretrained:        a.pretrained_model,
            device:            a.device.parse()?,
            catalog:           a.catalog,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// All arguments for the `report` command
#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Name of the run to report on
    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "models")]
    pub output_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::options::{LossKind, OptimizerKind, PredictionKind, SchedulerKind};
    use clap::Parser;

    fn train_args(extra: &[&str]) -> TrainArgs {
        let argv = ["retina-cv", "train"].iter().chain(extra).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(a) => a,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults_resolve() {
        let cfg = RunConfig::try_from(train_args(&[])).unwrap();
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn test_kind_strings_resolve_once() {
        let cfg = RunConfig::try_from(train_args(&[
            "--loss", "MSELoss",
            "--pred-type", "regression",
            "--optimizer", "AdamW",
            "--scheduler", "ReduceLROnPlateau",
            "--arch", "cnn_tiny",
            "--train-dataset", "diabetic_retinopathy",
            "--rotate", "false",
            "--shear-min", "-10",
            "--translate", "true",
            "--translate-min", "0.1",
        ]))
        .unwrap();

        assert_eq!(cfg.loss, LossKind::Mse);
        assert_eq!(cfg.prediction, PredictionKind::Regression);
        assert_eq!(cfg.optimizer, OptimizerKind::AdamW);
        assert_eq!(cfg.scheduler, SchedulerKind::ReduceOnPlateau);
        assert_eq!(cfg.name, "gcn_cnn_tiny_diabetic_retinopathy");
        assert!(!cfg.augment.rotate);
        assert_eq!(cfg.augment.shear_min, -10.0);
        assert!(cfg.augment.translate);
        assert_eq!(cfg.augment.translate_min, 0.1);
        assert_eq!(cfg.num_outputs(), 1);
    }

    #[test]
    fn test_configuration_errors() {
        for extra in [
            &["--loss", "MSELoss"][..],
            &["--optimizer", "RAdam"][..],
            &["--train-dataset", "messidor"][..],
            &["--arch", "resnet34"][..],
            &["--pred-type", "ordinal"][..],
        ] {
            let err = RunConfig::try_from(train_args(extra)).unwrap_err();
            assert!(matches!(err, TrainError::Configuration(_)), "{extra:?}: {err:?}");
        }
    }
}
