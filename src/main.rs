//
// main.rs
// nii2seg
//
// Binary entry point that hands off execution to the CLI layer and returns its exit status.
//
// Thales Matheus Mendonça Santos - October 2026

use std::process::ExitCode;

use nii2seg::cli;

fn main() -> ExitCode {
    cli::run()
}
