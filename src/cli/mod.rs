// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`  — cross-validated training of one run
//   2. `report` — prints the summary tables of a run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ReportArgs, TrainArgs};

use crate::application::train_use_case::{RunConfig, TrainUseCase};
use crate::domain::fold_state::SelectionCriterion;
use crate::domain::summary::SummaryTable;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::run_store::RunDirectory;

#[derive(Parser, Debug)]
#[command(
    name = "retina-cv",
    version = "0.1.0",
    about = "Cross-validated training of diabetic-retinopathy graders."
)]
pub struct Cli {
    /// The subcommand to run (train or report)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Report(args) => run_report(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    // Convert CLI args → application config; kind strings are resolved here
    let config = RunConfig::try_from(args)?;
    tracing::info!("Starting run '{}' on {}", config.name, config.datasets);

    let summary = TrainUseCase::new(config).execute()?;

    for table in [&summary.primary, &summary.secondary] {
        let rows = table.records().into_iter().map(|r| r.to_vec()).collect::<Vec<_>>();
        print_table(&title(table.criterion()), &SummaryTable::COLUMNS.map(String::from), &rows);
    }
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let run = RunDirectory::open(args.output_dir.join(&args.name))?;
    let cfg = CheckpointManager::new(run.dir()).load_config()?;
    println!("{}", describe(&cfg));
    for criterion in [SelectionCriterion::Score, SelectionCriterion::Accuracy] {
        let (headers, rows) = run.read_summary(criterion)?;
        print_table(&title(criterion), &headers, &rows);
    }
    Ok(())
}

/// One-line description of a run's configuration.
fn describe(cfg: &RunConfig) -> String {
    format!(
        "Run '{}': {} on {}, {:?} loss, {} folds{}, {} epochs, {:?} lr={:.1e}",
        cfg.name,
        cfg.arch,
        cfg.datasets,
        cfg.loss,
        cfg.n_splits,
        if cfg.cv { "" } else { " (first only)" },
        cfg.epochs,
        cfg.optimizer,
        cfg.lr,
    )
}

fn title(criterion: SelectionCriterion) -> String {
    format!("Best by {}", criterion.label())
}

/// Left-aligned columns padded to their widest cell.
fn print_table(title: &str, headers: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("\n{title}");
    println!("{}", line(headers));
    for row in rows {
        println!("{}", line(row));
    }
}
