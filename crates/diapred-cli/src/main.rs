//! Console entry point: load patients from SQL, cross-validate, fit the
//! final model, persist it, and run two sample predictions.

use chrono::Local;
use clap::Parser;
use diapred_core::settings::Settings;
use diapred_core::{PatientRecord, PatientSchema, PatientSource};
use diapred_ml::{
    artifact, cross_validate, metrics, trainer, MulticlassMetrics, PipelineSpec, PredictionEngine,
};
use diapred_storage::SqlitePatientRepository;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "diapred", about = "Diabetes prediction model trainer")]
struct Cli {
    /// Path to the JSON settings file holding the connection string.
    #[arg(long, default_value = "appsettings.json")]
    settings: PathBuf,

    /// Connection string fallback when the settings file has none.
    #[arg(long)]
    connection_string: Option<String>,

    /// Fraction of rows held out as the test set.
    #[arg(long, default_value = "0.2")]
    test_fraction: f64,

    /// Number of cross-validation folds.
    #[arg(long, default_value = "10")]
    folds: usize,

    /// Cap on training iterations per class learner.
    #[arg(long, default_value = "10")]
    max_iterations: usize,

    /// Learner step size.
    #[arg(long, default_value = "0.1")]
    learning_rate: f64,

    /// Seed for the split, the fold shuffle, and weight initialization.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Output path for the fitted model artifact.
    #[arg(long, default_value = "MLModel.zip")]
    model_out: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(&cli.settings)?;
    let connection_string =
        settings.connection_string("DbConnection", cli.connection_string.as_deref())?;

    let schema = PatientSchema::default();

    info!("Loading data from database...");
    let repository = SqlitePatientRepository::connect(&connection_string, schema.clone()).await?;
    let records = repository.fetch_all().await?;
    info!("Loaded {} patient rows", records.len());

    let split = diapred_ml::train_test_split(records, cli.test_fraction, cli.seed);

    info!("Preparing training operations...");
    let spec = PipelineSpec {
        schema: schema.clone(),
        max_iterations: cli.max_iterations,
        learning_rate: cli.learning_rate,
        weight_decay: 1e-4,
        seed: cli.seed,
    };

    info!("Starting {} fold cross validation", cli.folds);
    let fold_metrics = cross_validate(&spec, &split.train, cli.folds, cli.seed)?;
    print_metrics_report(&MulticlassMetrics::average(&fold_metrics));

    println!(
        "Training process is starting. {}",
        Local::now().format("%H:%M:%S")
    );
    let model = trainer::fit(&spec, &split.train)?;
    println!(
        "Training process has finished. {}",
        Local::now().format("%H:%M:%S")
    );

    println!("Test Set: {} patients", split.test.len());
    if !split.test.is_empty() {
        let held_out = metrics::evaluate(&model, &split.test)?;
        info!("Held-out test metrics: {held_out}");
    }

    info!("Saving the model to {}", cli.model_out.display());
    artifact::save(&model, &schema, &cli.model_out)?;

    let engine = PredictionEngine::new(model);
    for patient in sample_patients() {
        let prediction = engine.predict(&patient)?;
        println!(
            "Diabetes? {} | Prediction: {}",
            prediction.scores[0],
            if prediction.label > 0.0 { "Yes" } else { "No" }
        );
    }

    Ok(())
}

/// The averaged cross-validation report block.
fn print_metrics_report(m: &MulticlassMetrics) {
    println!("{:*<110}", "");
    println!("*       Metrics for multi-class classification model");
    println!("{:-<110}", "");
    println!("*       Average MicroAccuracy:    {:.3}", m.micro_accuracy);
    println!("*       Average MacroAccuracy:    {:.3}", m.macro_accuracy);
    println!("*       Average LogLoss:          {:.3}", m.log_loss);
    println!(
        "*       Average LogLossReduction: {:.3}",
        m.log_loss_reduction
    );
    println!("{:*<110}", "");
}

/// The two fixed sample patients scored at the end of every run.
fn sample_patients() -> [PatientRecord; 2] {
    [
        PatientRecord {
            id: 0.0,
            pregnancies: 6.0,
            glucose: 148.0,
            blood_pressure: 72.0,
            skin_thickness: 35.0,
            insulin: 200.0,
            bmi: 33.6,
            diabetes_pedigree_function: 0.627,
            age: 50.0,
            output: 0.0,
        },
        PatientRecord {
            id: 0.0,
            pregnancies: 1.0,
            glucose: 85.0,
            blood_pressure: 66.0,
            skin_thickness: 29.0,
            insulin: 200.0,
            bmi: 26.6,
            diabetes_pedigree_function: 0.351,
            age: 31.0,
            output: 0.0,
        },
    ]
}
