//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs the log subscriber
//! - loads and inspects data
//! - compiles equations
//! - runs fits and prints reports
//! - writes optional exports

use std::io::IsTerminal;

use clap::Parser;

use crate::cli::{Command, EquationArgs, FitArgs, InspectArgs};
use crate::domain::{FitOptions, SessionConfig};
use crate::error::Result;
use crate::expr::Compiler;
use crate::io::parse_roles;

pub mod pipeline;

use pipeline::FitConfig;

/// Entry point for the `labfit` binary.
pub fn run() -> Result<()> {
    let cli = crate::cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Equation(args) => handle_equation(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<()> {
    let config = fit_config_from_args(&args)?;
    let show_progress = std::io::stderr().is_terminal();

    let out = pipeline::run_fit(&config, |equation, snap| {
        if show_progress && !snap.done {
            eprint!("\rfitting {equation}: {:>3.0}%", snap.fraction() * 100.0);
        }
    })?;
    if show_progress {
        eprint!("\r\x1b[2K");
    }

    if let (Some(data), Some(policy)) = (out.session.data(), out.session.policy()) {
        println!("{}", crate::report::format_data_summary(&data, &policy));
    }
    for run in &out.runs {
        println!("{}", crate::report::format_fit_result(&run.result, run.warning.as_ref()));
        if config.worst > 0 {
            let worst = crate::report::worst_points(&run.residuals, config.worst);
            println!("Largest residuals:");
            println!("{}", crate::report::format_residual_table(&worst));
        }
    }
    if out.runs.len() > 1 {
        print!("{}", crate::report::format_history(out.session.history()));
    }
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let session_config = SessionConfig {
        locale: args.data.locale,
        sigma_zero_eps: args.data.sigma_eps,
        ..SessionConfig::default()
    };
    let roles = args.data.roles.as_deref().map(parse_roles).transpose()?;
    let session = pipeline::prepare_session(session_config, &args.data.data, roles.as_deref())?;

    if let (Some(data), Some(policy)) = (session.data(), session.policy()) {
        println!("{}", crate::report::format_data_summary(&data, &policy));
    }
    if let Some(preview) = session.preview() {
        print!("{}", crate::report::format_preview(preview));
    }
    Ok(())
}

fn handle_equation(args: EquationArgs) -> Result<()> {
    let compiler = Compiler::default();
    let model = compiler.compile(&args.equation, args.params.as_deref())?;
    print!("{}", crate::report::format_model(&model));
    Ok(())
}

/// Map CLI arguments onto the pipeline configuration.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig> {
    let roles = args.data.roles.as_deref().map(parse_roles).transpose()?;
    let defaults = FitOptions::default();
    let opts = FitOptions {
        robust_strategy: args.robust_strategy,
        bootstrap_samples: args.samples.unwrap_or(defaults.bootstrap_samples),
        bayesian_samples: args.samples.unwrap_or(defaults.bayesian_samples),
        seed: args.seed,
        sigma_zero_eps: args.data.sigma_eps,
        ..defaults
    };
    Ok(FitConfig {
        data: args.data.data.clone(),
        roles,
        equations: args.equations.clone(),
        params: args.params.clone(),
        initial: args.initial.clone(),
        method: args.method,
        opts,
        session: SessionConfig {
            locale: args.data.locale,
            sigma_zero_eps: args.data.sigma_eps,
            max_iter: args.max_iter,
            seed: args.seed,
        },
        worst: args.worst,
        export: args.export.clone(),
        export_residuals: args.export_residuals.clone(),
    })
}
