//! `dynsys`: a thin CLI demo surface over the kernel library (SPEC_FULL.md
//! §3.4). Not a wire protocol the library depends on — this binary only
//! exists behind the `cli` feature to give the crate something runnable.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nalgebra::DVector;

use dynsys_kernel::{
    equilibrium::{solve_equilibrium_full, NewtonSettings},
    expr::compile,
    lyapunov::{full_spectrum, lyapunov_dimension, LyapunovSettings},
    marching_squares::{march_squares_model, LatticeAxis},
    model::{Model, Parameters},
};

#[derive(Parser)]
#[command(name = "dynsys", about = "Numerical kernel for continuous-time dynamical systems")]
struct Cli {
    /// Path to a model file: lines of `var: expression` plus `param name
    /// value` lines, `#`-prefixed comments allowed.
    #[arg(short, long)]
    model: PathBuf,

    /// Initial state, comma-separated, in declaration order.
    #[arg(short, long, value_delimiter = ',')]
    x0: Vec<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve for an equilibrium near `x0` and report its eigenvalues.
    Equilibrium,
    /// Estimate the full Lyapunov spectrum starting from `x0`.
    Lyapunov {
        #[arg(long, default_value_t = 0.01)]
        h: f64,
        #[arg(long, default_value_t = 20000)]
        steps: usize,
        #[arg(long, default_value_t = 5000)]
        transient: usize,
        #[arg(long, default_value_t = 10)]
        reorth: usize,
    },
    /// Extract the isocline `{x : expr(x) = level}` over a 2-D lattice in
    /// `x_axis`/`y_axis`, optionally sliced along `z_axis`. `x0` supplies the
    /// fixed value for every state component not named as an axis.
    Isocline {
        #[arg(long)]
        expr: String,
        #[arg(long, default_value_t = 0.0)]
        level: f64,
        #[arg(long)]
        x_axis: String,
        #[arg(long)]
        y_axis: String,
        #[arg(long, value_delimiter = ',')]
        x_range: Vec<f64>,
        #[arg(long, value_delimiter = ',')]
        y_range: Vec<f64>,
        #[arg(long, default_value_t = 101)]
        x_res: usize,
        #[arg(long, default_value_t = 101)]
        y_res: usize,
        #[arg(long)]
        z_axis: Option<String>,
        #[arg(long, value_delimiter = ',')]
        z_range: Vec<f64>,
        #[arg(long, default_value_t = 2)]
        z_res: usize,
    },
}

fn load_model(path: &PathBuf) -> anyhow::Result<(Model, Parameters)> {
    let text = fs::read_to_string(path)?;
    let mut equations = Vec::new();
    let mut params = Parameters::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("param ") {
            let mut parts = rest.split_whitespace();
            let name = parts.next().ok_or_else(|| anyhow::anyhow!("line {}: missing param name", lineno + 1))?;
            let value: f64 = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("line {}: missing param value", lineno + 1))?
                .parse()?;
            params.insert(name, value);
            continue;
        }
        let (var, expr) = line
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("line {}: expected 'var: expr'", lineno + 1))?;
        equations.push((var.trim().to_string(), expr.trim().to_string()));
    }
    let model = Model::new(equations)?;
    Ok((model, params))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let (model, params) = load_model(&cli.model)?;

    if cli.x0.len() != model.dim() {
        anyhow::bail!("--x0 has {} components but the model has {}", cli.x0.len(), model.dim());
    }
    let x0 = DVector::from_vec(cli.x0.clone());

    match cli.command {
        Command::Equilibrium => {
            let eq = solve_equilibrium_full(&model, &params, &x0, NewtonSettings::default())?;
            log::info!("converged to {:?}", eq.state);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "state": eq.state.as_slice(),
                "eigenvalues": eq.eigenvalues.iter().map(|c| (c.re, c.im)).collect::<Vec<_>>(),
            }))?);
        }
        Command::Lyapunov { h, steps, transient, reorth } => {
            let settings = LyapunovSettings {
                h,
                reorth_steps: reorth,
                total_steps: steps,
                transient_steps: transient,
            };
            let spectrum = full_spectrum(&model, &params, &x0, settings, None)?;
            let dim = lyapunov_dimension(&spectrum);
            log::info!("spectrum = {:?}, dimension = {}", spectrum, dim);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "spectrum": spectrum,
                "lyapunov_dimension": dim,
            }))?);
        }
        Command::Isocline { expr, level, x_axis, y_axis, x_range, y_range, x_res, y_res, z_axis, z_range, z_res } => {
            let names: Vec<String> = model.variable_names().iter().map(|s| s.to_string()).collect();
            let g = compile(&expr, &names)?;
            let axis_index = |name: &str| {
                model.variable_index(name).ok_or_else(|| anyhow::anyhow!("unknown state variable '{name}'"))
            };
            if x_range.len() != 2 || y_range.len() != 2 {
                anyhow::bail!("--x-range and --y-range each need exactly 2 values");
            }
            let mut axes = vec![
                LatticeAxis { variable: axis_index(&x_axis)?, min: x_range[0], max: x_range[1], resolution: x_res },
                LatticeAxis { variable: axis_index(&y_axis)?, min: y_range[0], max: y_range[1], resolution: y_res },
            ];
            if let Some(z_axis) = z_axis {
                if z_range.len() != 2 {
                    anyhow::bail!("--z-range needs exactly 2 values when --z-axis is given");
                }
                axes.push(LatticeAxis {
                    variable: axis_index(&z_axis)?,
                    min: z_range[0],
                    max: z_range[1],
                    resolution: z_res,
                });
            }
            let slices = march_squares_model(&model, &params, &g, level, &x0, &axes)?;
            log::info!("extracted {} slice(s)", slices.len());
            println!("{}", serde_json::to_string_pretty(&slices)?);
        }
    }
    Ok(())
}
