//! Solves every scenario of a parameter sweep.
//!
//! ```text
//! experiment [SWEEP.json | PRESET] [OUT_DIR]
//! ```
//!
//! Traces are cached in `OUT_DIR/traces/` and shared between scenarios that
//! differ only in drones, alpha or grid. Each scenario leaves its model in LP
//! format and a summary in `OUT_DIR/<experiment_name>/`; a scenario whose
//! summary file already exists is skipped.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use fanet_planner::CoverageGraph;
use fanet_sim::{generate_feasible, RetryPolicy, TargetsTrace};
use fanet_structs::{report::ResultRow, scenario::Scenario, scenario::Sweep};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};

#[cfg(not(feature = "highs"))]
pub fn main() {
    println!("solving not supported -- enable the 'highs' crate feature")
}

fn load_sweep(arg: &str) -> anyhow::Result<Sweep> {
    if let Some(sweep) = Sweep::preset(arg) {
        return Ok(sweep);
    }
    if !arg.ends_with(".json") {
        bail!("unknown preset `{}` (expected default, test, experiment, time_limit or a .json file)", arg);
    }
    let text = fs::read_to_string(arg).with_context(|| format!("reading sweep {}", arg))?;
    serde_json::from_str(&text).with_context(|| format!("parsing sweep {}", arg))
}

/// FNV-1a over the trace key, so every cached trace has its own stream.
fn trace_seed(key: &str) -> u64 {
    key.bytes()
        .fold(0xcbf29ce484222325, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3))
}

fn load_or_generate_trace(dir: &Path, scenario: &Scenario, graph: &CoverageGraph) -> anyhow::Result<TargetsTrace> {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("trace");
    let path = dir.join(format!("trace_{}.txt", scenario.trace_key()));
    if path.exists() {
        let trace = TargetsTrace::load(&path).with_context(|| format!("loading {}", path.display()))?;
        if !graph.is_feasible(&trace) {
            warn!("Cached trace {} has uncoverable targets on this grid", path.display());
        }
        return Ok(trace);
    }

    let mut rng = StdRng::seed_from_u64(trace_seed(&scenario.trace_key()));
    let (trace, attempts) = generate_feasible(scenario.trace, &mut rng, &RetryPolicy::default(), |t| {
        graph.is_feasible(t)
    })
    .with_context(|| format!("generating trace {}", scenario.trace_key()))?;
    info!("Generated {} in {} attempts", path.display(), attempts);
    trace.save(&path).with_context(|| format!("saving {}", path.display()))?;
    Ok(trace)
}

fn write_model(path: &Path, model: &fanet_planner::DeploymentModel) -> anyhow::Result<()> {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("write model");
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    model
        .model()
        .write_lp(std::io::BufWriter::new(file))
        .with_context(|| format!("writing {}", path.display()))
}

fn append_row(path: &Path, row: &ResultRow) -> anyhow::Result<()> {
    let write_header = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(write_header).from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "highs")]
pub fn main() -> anyhow::Result<()> {
    use fanet_planner::{extsolvers::highs::HighsSolver, DeploymentModel};
    use std::io::Write;

    env_logger::init();
    let mut args = std::env::args().skip(1);
    let sweep = load_sweep(args.next().as_deref().unwrap_or("test"))?;
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "results".to_string()));
    sweep.validate()?;

    let experiment_dir = out_dir.join(&sweep.experiment_name);
    let trace_dir = out_dir.join("traces");
    for dir in [&experiment_dir, &trace_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(experiment_dir.join("parameters.json"), serde_json::to_string_pretty(&sweep)?)?;

    let scenarios = sweep.scenarios();
    println!("-------------------------");
    println!("fanet deployment sweep");
    println!("-------------------------");
    println!();
    println!("  experiment: {}", sweep.experiment_name);
    println!("  scenarios:  {}", scenarios.len());
    println!();

    let mut rows = Vec::new();
    for (i, scenario) in scenarios.iter().enumerate() {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("scenario");
        let key = scenario.key();
        let summary_path = experiment_dir.join(format!("solution_{}.txt", key));
        if summary_path.exists() {
            info!("Skipping {}, already solved", key);
            continue;
        }
        println!(" * [{}/{}] {}", i + 1, scenarios.len(), key);

        let graph = CoverageGraph::new(scenario.graph.clone())?;
        let trace = load_or_generate_trace(&trace_dir, scenario, &graph)?;
        let model = DeploymentModel::build(scenario.model, &trace, &graph)?;
        write_model(&experiment_dir.join(format!("model_{}.lp", key)), &model)?;
        let mut solver = HighsSolver::with_limits(&sweep.limits);
        let solution = model.solve(&mut solver)?;

        fs::write(&summary_path, solution.summary().to_string())
            .with_context(|| format!("writing {}", summary_path.display()))?;

        let row = ResultRow {
            scenario: key,
            positions_per_axis: scenario.graph.positions_per_axis,
            n_drones: scenario.model.n_drones,
            n_targets: scenario.trace.n_targets,
            target_speed: scenario.trace.target_speed,
            alpha: scenario.model.alpha,
            instance: scenario.instance,
            status: solution.status(),
            objective: solution.objective_value(),
            distance: solution.total_distance(),
            energy: solution.total_energy(),
            solve_time: solution.solve_time(),
        };
        append_row(&experiment_dir.join("results.csv"), &row)?;
        rows.push(row);
    }

    #[cfg(feature = "prof")]
    {
        println!();
        println!("# PROFILER");
        hprof::profiler().print_timing();
    }

    println!();
    println!("# RESULTS");
    let mut tablewriter = tabwriter::TabWriter::new(std::io::stdout());
    writeln!(&mut tablewriter, "p\tdrones\ttargets\tspeed\talpha\tidx\t|\tstatus\ttime\tobj\tdist\tenergy")?;
    writeln!(&mut tablewriter, "---\t---\t---\t---\t---\t---\t\t---\t---\t---\t---\t---")?;
    for row in rows.iter() {
        writeln!(
            &mut tablewriter,
            "{}\t{}\t{}\t{}\t{}\t{}\t|\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.0}",
            row.positions_per_axis,
            row.n_drones,
            row.n_targets,
            row.target_speed,
            row.alpha,
            row.instance,
            row.status,
            row.solve_time,
            row.objective,
            row.distance,
            row.energy
        )?;
    }
    tablewriter.flush()?;
    Ok(())
}
