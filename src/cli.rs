//
// cli.rs
// nii2seg
//
// Defines the CLI surface with Clap, sets up logging, runs the conversion and maps failures to exit codes.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::Level;

use crate::convert::{self, ConversionJob, ConverterConfig};
use crate::mask::LabelSelector;
use crate::models::ConversionReport;
use crate::orientation::Orientation;
use crate::reference::SliceOrder;
use crate::uid;

/// Command-line interface: three positional paths plus optional overrides of
/// the conversion defaults.
#[derive(Parser, Debug)]
#[command(name = "nii2seg", version)]
#[command(
    about = "Convert a NIfTI vertebra mask into a DICOM SEG aligned with a reference series",
    long_about = None
)]
pub struct Cli {
    /// NIfTI label mask (.nii or .nii.gz)
    pub nifti_mask: PathBuf,
    /// Directory holding the reference DICOM slices
    pub reference_dicom_dir: PathBuf,
    /// Path of the DICOM SEG file to write
    pub output: PathBuf,

    /// Axis mapping from NIfTI (i,j,k) to (frame,row,column), e.g. `k-,j,i`, `legacy` or `native`
    #[arg(long)]
    pub orientation: Option<Orientation>,
    /// How reference slices are ordered into frames
    #[arg(long, value_enum)]
    pub slice_order: Option<SliceOrderArg>,
    /// Extension of the reference files
    #[arg(long, value_parser = parse_extension)]
    pub extension: Option<String>,
    /// Only voxels equal to this label are foreground (default: any positive value)
    #[arg(long)]
    pub label: Option<u32>,

    #[arg(long)]
    pub segment_label: Option<String>,
    #[arg(long)]
    pub algorithm_name: Option<String>,
    #[arg(long)]
    pub algorithm_version: Option<String>,

    #[arg(long)]
    pub series_number: Option<i32>,
    #[arg(long)]
    pub instance_number: Option<i32>,
    #[arg(long)]
    pub series_description: Option<String>,

    #[arg(long)]
    pub manufacturer: Option<String>,
    #[arg(long)]
    pub model_name: Option<String>,
    #[arg(long)]
    pub software_versions: Option<String>,
    #[arg(long)]
    pub device_serial_number: Option<String>,

    /// Use this Series Instance UID instead of generating one
    #[arg(long, value_parser = parse_uid)]
    pub series_uid: Option<String>,
    /// Use this SOP Instance UID instead of generating one
    #[arg(long, value_parser = parse_uid)]
    pub instance_uid: Option<String>,
    /// Content Date/Time as YYYYMMDDHHMMSS (default: taken from the reference series)
    #[arg(long, value_parser = parse_content_datetime)]
    pub content_datetime: Option<NaiveDateTime>,

    /// Print the conversion report as JSON
    #[arg(long)]
    pub json: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum SliceOrderArg {
    /// Sort by Image Position (Patient) along the slice normal
    Position,
    /// Sort by file name
    Filename,
}

impl From<SliceOrderArg> for SliceOrder {
    fn from(value: SliceOrderArg) -> Self {
        match value {
            SliceOrderArg::Position => SliceOrder::Position,
            SliceOrderArg::Filename => SliceOrder::Filename,
        }
    }
}

impl Cli {
    /// Overlay the given options on the default configuration.
    pub fn config(&self) -> ConverterConfig {
        let mut config = ConverterConfig::default();
        if let Some(orientation) = self.orientation {
            config.orientation = orientation;
        }
        if let Some(order) = self.slice_order {
            config.slice_order = order.into();
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if let Some(label) = self.label {
            config.label = LabelSelector::Exact(label);
        }
        override_with(&mut config.segment_label, &self.segment_label);
        override_with(&mut config.algorithm_name, &self.algorithm_name);
        override_with(&mut config.algorithm_version, &self.algorithm_version);
        if let Some(number) = self.series_number {
            config.series_number = number;
        }
        if let Some(number) = self.instance_number {
            config.instance_number = number;
        }
        config.series_description = self.series_description.clone();
        override_with(&mut config.equipment.manufacturer, &self.manufacturer);
        override_with(&mut config.equipment.model_name, &self.model_name);
        override_with(&mut config.equipment.software_versions, &self.software_versions);
        override_with(
            &mut config.equipment.device_serial_number,
            &self.device_serial_number,
        );
        config.series_uid = self.series_uid.clone();
        config.instance_uid = self.instance_uid.clone();
        config.content_datetime = self.content_datetime;
        config
    }

    pub fn job(&self) -> ConversionJob {
        ConversionJob {
            mask: self.nifti_mask.clone(),
            reference_dir: self.reference_dicom_dir.clone(),
            output: self.output.clone(),
            config: self.config(),
        }
    }
}

fn override_with(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn parse_extension(value: &str) -> Result<String, String> {
    let extension = value.trim().trim_start_matches('.');
    if extension.is_empty() {
        return Err("extension must not be empty".into());
    }
    Ok(extension.to_string())
}

fn parse_uid(value: &str) -> Result<String, String> {
    if uid::is_valid_uid(value) {
        Ok(value.to_string())
    } else {
        Err(format!("{:?} is not a valid DICOM UID", value))
    }
}

fn parse_content_datetime(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S")
        .map_err(|e| format!("expected YYYYMMDDHHMMSS: {}", e))
}

/// Exit status for a failed argument parse: help and version are not errors.
fn parse_failure_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

fn print_report(report: &ConversionReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = parse_failure_code(err.kind());
            // Printing can only fail if stdout/stderr is gone.
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("warning: logging disabled: {:#}", err);
    }

    match convert::convert(&cli.job()) {
        Ok(report) => match print_report(&report, cli.json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {:#}", err);
                ExitCode::from(2)
            }
        },
        Err(err) => {
            let step = err.step();
            let code = err.exit_code();
            eprintln!("error[{}]: {:#}", step, anyhow::Error::new(err));
            ExitCode::from(code)
        }
    }
}
