use clap::Parser;
use pflock::{Config, ConfigSource, DefaultSource, FileSource, Overrides, Simulation};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Distributed flocking simulation over a power-of-4 rank grid.
#[derive(Debug, Parser)]
#[command(name = "pflock", version, about)]
struct Cli {
    /// Configuration file (JSON, or `key = value` for .ini/.toml); built-in
    /// defaults when omitted.
    config: Option<PathBuf>,

    /// Number of ranks, a power of 4. Ignored with --mpi.
    #[arg(short = 'n', long, default_value_t = 4)]
    ranks: usize,

    /// Run one rank per process under mpirun, taking the rank count from
    /// the MPI world.
    #[cfg(feature = "mpi")]
    #[arg(long)]
    mpi: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Total number of boids.
    #[arg(long)]
    boids: Option<u64>,

    /// Number of ticks to simulate.
    #[arg(long)]
    ticks: Option<u64>,

    /// Constant boid speed.
    #[arg(long)]
    speed: Option<f64>,

    #[arg(long)]
    dt: Option<f64>,

    /// Turning noise amplitude in radians.
    #[arg(long)]
    noise: Option<f64>,

    /// Neighbor radius.
    #[arg(long)]
    cutoff: Option<f64>,

    /// Side length of the periodic domain.
    #[arg(long)]
    side_len: Option<f64>,

    /// Write every frame to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the per-tick invariant checks.
    #[arg(long)]
    no_checks: bool,

    /// Print the resolved configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            seed: self.seed,
            num_boids: self.boids,
            num_ticks: self.ticks,
            v: self.speed,
            dt: self.dt,
            noise: self.noise,
            cutoff: self.cutoff,
            side_len: self.side_len,
            output: self.output.clone(),
        }
    }

    fn source(&self) -> Box<dyn ConfigSource> {
        match &self.config {
            Some(path) => Box::new(self.overrides().over(FileSource::new(path))),
            None => Box::new(self.overrides().over(DefaultSource)),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn report_time(secs: f64) {
    println!("That took {secs:.6} seconds");
}

/// One rank of an `mpirun` launch. Errors every rank hits identically are
/// printed by rank 0 only; any other failure is printed by the failing rank,
/// which then aborts the job.
#[cfg(feature = "mpi")]
fn run_mpi(cli: &Cli) -> ExitCode {
    use pflock::comm::ROOT;
    use pflock::{Communicator, FlockError, MpiComm};

    let (_universe, comm) = match MpiComm::initialize() {
        Ok(world) => world,
        Err(err) => {
            eprintln!("pflock: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = cli.source().load().map_err(FlockError::from).and_then(|config| {
        Simulation::new(config)
            .with_checks(!cli.no_checks)
            .run_rank(&comm)
    });
    match result {
        Ok(summary) => {
            if comm.rank() == ROOT {
                info!(order_parameter = summary.order_parameter, "done");
                report_time(summary.elapsed.as_secs_f64());
            }
            ExitCode::SUCCESS
        }
        Err(err) if err.is_shared() || matches!(err, FlockError::Config(_)) => {
            if comm.rank() == ROOT {
                eprintln!("pflock: {err}");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("pflock: rank {}: {err}", comm.rank());
            comm.abort();
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> pflock::Result<()> {
    let config: Config = cli.source().load()?;
    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let summary = Simulation::new(config)
        .with_ranks(cli.ranks)
        .with_checks(!cli.no_checks)
        .run()?;

    info!(
        boids = summary.total_boids(),
        order_parameter = summary.order_parameter,
        "done"
    );
    report_time(summary.elapsed.as_secs_f64());
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    #[cfg(feature = "mpi")]
    if cli.mpi && !cli.print_config {
        return run_mpi(&cli);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pflock: {err}");
            ExitCode::FAILURE
        }
    }
}
