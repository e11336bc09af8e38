use clap::{Args, Parser, Subcommand, ValueHint};
use perimeter_control_core_rs::{
    DetectorConfig, IntersectionConfig, SimulationSettings, TopologyProvider,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Inspect and validate perimeter control configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every configuration document and cross-check them
    Check(CheckArgs),

    /// Show the traffic light and phase layout a plan for one intersection would use
    PlanLayout(PlanLayoutArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Detector grouping document (detector_config.json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    detectors: PathBuf,

    /// Intersection topology document (intersection_config.json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    intersections: PathBuf,

    /// Run settings (simulation.yml)
    #[arg(long, value_hint = ValueHint::FilePath)]
    settings: Option<PathBuf>,
}

#[derive(Args)]
struct PlanLayoutArgs {
    /// Intersection topology document (intersection_config.json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    intersections: PathBuf,

    /// Intersection id
    intersection_id: String,
}

/// Returns the number of problems found
fn check(args: &CheckArgs) -> Result<usize> {
    let detectors = DetectorConfig::load(&args.detectors)?;
    let topology = IntersectionConfig::load(&args.intersections)?;

    info!(
        network_detectors = detectors.network_detectors().len(),
        "loaded network accumulation detectors"
    );
    info!(
        intersections = detectors.num_monitored_intersections(),
        "loaded solver detector groups"
    );
    info!(
        flow_detectors = detectors.flow_detectors().len(),
        "loaded flow detectors"
    );
    info!(
        traffic_lights = topology.traffic_lights.len(),
        "loaded intersection topology"
    );

    let mut problems = 0;
    if let Some(path) = &args.settings {
        let settings = SimulationSettings::load(path)?;
        match settings.to_pipeline_config() {
            Ok(config) => info!(
                sampling_interval_s = config.sampling_interval_s,
                aggregation_interval_s = config.aggregation_interval_s,
                control_interval_s = config.control_interval_s,
                total_simulation_time_s = config.total_simulation_time_s,
                "settings valid"
            ),
            Err(err) => {
                error!(error = %err, "invalid settings");
                problems += 1;
            }
        }
    }

    let issues = topology.validate_against(&detectors);
    for issue in &issues {
        warn!(issue = %issue, "configuration issue");
        println!("{}", issue);
    }
    problems += issues.len();

    if problems == 0 {
        println!("configuration OK");
    }
    Ok(problems)
}

/// Returns false when the intersection cannot be actuated
fn plan_layout(args: &PlanLayoutArgs) -> Result<bool> {
    let topology = IntersectionConfig::load(&args.intersections)?;
    let id = &args.intersection_id;

    let traffic_light = topology.traffic_light_id(id);
    let phase_info = topology.phase_info(id);

    println!("intersection:  {}", id);
    match &traffic_light {
        Some(tl) => {
            let phases = topology.traffic_lights.get(tl).map_or(0, |t| t.phases.len());
            println!("traffic light: {} ({} phases)", tl, phases);
        }
        None => println!("traffic light: <unresolved>"),
    }
    match &phase_info {
        Some(info) => {
            println!("primary:       {:?}", info.primary);
            println!("secondary:     {:?}", info.secondary);
        }
        None => println!("phase layout:  <missing>"),
    }
    println!("cycle length:  {}", topology.cycle_length(id));

    Ok(traffic_light.is_some() && phase_info.is_some())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter("perimeter_control_core_rs=info,perimeter_cli=info")
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Command::Check(args) => check(args).map(|problems| problems == 0),
        Command::PlanLayout(args) => plan_layout(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}
