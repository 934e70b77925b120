//! Simulation builder and per-rank driver.
//!
//! [`Simulation`] is the entry point: configure it with method chaining and
//! call `.run()`. It launches one [`RankSimulation`] per rank, each on its
//! own thread over a [`LocalCluster`], and folds their results into a
//! [`RunSummary`]. Under MPI every process calls
//! [`Simulation::run_rank`] with its own communicator instead.

use crate::boid::Boid;
use crate::comm::{Communicator, LocalCluster, ROOT};
use crate::config::Config;
use crate::decomposition::scatter;
use crate::error::{FlockError, Result, TopologyError};
use crate::flocking::{integrate_positions, order_parameter, update_velocities};
use crate::halo::exchange_halo;
use crate::invariants::{verify_conservation, verify_locality, verify_speed};
use crate::migration::{migrate, MigrationStats};
use crate::output::{FrameWriter, NullWriter, SharedFileWriter};
use crate::random::SeededStream;
use crate::time::RunTimer;
use crate::topology::{power_of_four_exponent, RankTopology};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What happened on one rank during one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Boids owned after migration.
    pub local: usize,
    /// Neighbor boids seen during the velocity update.
    pub halo: usize,
    pub migration: MigrationStats,
    /// Global alignment after the tick.
    pub order_parameter: f64,
}

/// Outcome of a whole run on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RankSummary {
    pub rank: usize,
    pub ticks: u64,
    pub final_count: usize,
    pub elapsed: Duration,
    pub order_parameter: f64,
}

/// Outcome of a whole run across all ranks.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub ranks: usize,
    pub ticks: u64,
    /// Wall-clock time between the start and end barriers, as seen by rank 0.
    pub elapsed: Duration,
    /// Boids owned by each rank at the end, indexed by rank.
    pub final_counts: Vec<usize>,
    pub order_parameter: f64,
}

impl RunSummary {
    pub fn total_boids(&self) -> usize {
        self.final_counts.iter().sum()
    }
}

/// The state one rank owns for the lifetime of a run.
pub struct RankSimulation<'c, C: Communicator> {
    comm: &'c C,
    config: Config,
    topology: RankTopology,
    neighbors: Vec<usize>,
    local: Vec<Boid>,
    noise: SeededStream,
    writer: Box<dyn FrameWriter>,
    checks: bool,
}

impl<'c, C: Communicator> RankSimulation<'c, C> {
    /// Validate the setup and receive this rank's initial boids.
    ///
    /// Collective: every rank must call it.
    pub fn new(comm: &'c C, config: Config) -> Result<Self> {
        let mut sim = Self::with_boids(comm, config, Vec::new())?;
        sim.local = scatter(comm, &sim.config, &sim.topology)?;
        Ok(sim)
    }

    /// Start from a given local state instead of the seeded placement.
    pub fn with_boids(comm: &'c C, config: Config, local: Vec<Boid>) -> Result<Self> {
        config.validate()?;
        let topology = RankTopology::new(comm.rank(), comm.size(), config.side_len)?;
        if comm.rank() == ROOT && config.step_length() > topology.grid_width() {
            warn!(
                step = config.step_length(),
                tile = topology.grid_width(),
                "boids can cross more than one tile per tick"
            );
        }

        Ok(Self {
            comm,
            neighbors: topology.neighbors(),
            noise: SeededStream::for_rank(config.seed, comm.rank()),
            topology,
            config,
            local,
            writer: Box::new(NullWriter),
            checks: true,
        })
    }

    /// Send every frame to `writer`.
    pub fn with_writer(mut self, writer: Box<dyn FrameWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Enable or disable the post-tick invariant checks.
    ///
    /// Must be the same on every rank.
    pub fn with_checks(mut self, checks: bool) -> Self {
        self.checks = checks;
        self
    }

    pub fn local(&self) -> &[Boid] {
        &self.local
    }

    pub fn topology(&self) -> &RankTopology {
        &self.topology
    }

    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Advance by one tick.
    pub fn tick(&mut self, tick: u64) -> Result<TickReport> {
        let halo = exchange_halo(self.comm, tick, &self.neighbors, &self.local)?;
        for source in halo.origins() {
            trace!(tick, source, count = halo.from_rank(source).len(), "received halo");
        }

        self.writer.write_frame(self.comm, tick, &self.local)?;

        update_velocities(&mut self.local, &halo, &self.config, &mut self.noise);
        let plan = integrate_positions(
            &mut self.local,
            &self.config,
            &self.topology,
            &self.neighbors,
        )?;
        let migration = migrate(self.comm, tick, &self.neighbors, &mut self.local, &plan)?;

        let order = order_parameter(self.comm, &self.local, &self.config)?;

        if self.checks {
            verify_locality(tick, &self.topology, &self.local)?;
            verify_speed(tick, self.config.v, &self.local)?;
            verify_conservation(self.comm, tick, self.config.num_boids, &self.local)?;
        }

        debug!(
            tick,
            local = self.local.len(),
            halo = halo.len(),
            sent = migration.sent,
            received = migration.received,
            "tick complete"
        );

        Ok(TickReport {
            tick,
            local: self.local.len(),
            halo: halo.len(),
            migration,
            order_parameter: order,
        })
    }

    /// Run every configured tick between two barriers.
    pub fn run(mut self) -> Result<RankSummary> {
        let mut order = order_parameter(self.comm, &self.local, &self.config)?;

        self.comm.barrier()?;
        let mut timer = RunTimer::start();
        for tick in 0..self.config.num_ticks {
            order = self.tick(tick)?.order_parameter;
            timer.tick();
        }
        let busy = timer.elapsed();
        self.comm.barrier()?;
        let elapsed = timer.stop();

        // Time each rank spent before reaching the end barrier.
        if let Some(busy_secs) = self.comm.gather_f64(busy.as_secs_f64())? {
            let slowest = busy_secs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(rank, _)| rank)
                .unwrap_or(ROOT);
            info!(
                ticks = timer.ticks(),
                elapsed_secs = elapsed.as_secs_f64(),
                ticks_per_sec = timer.ticks_per_second(),
                slowest_rank = slowest,
                order_parameter = order,
                "run finished"
            );
        }

        Ok(RankSummary {
            rank: self.comm.rank(),
            ticks: timer.ticks(),
            final_count: self.local.len(),
            elapsed,
            order_parameter: order,
        })
    }
}

/// A distributed flocking run.
///
/// Use method chaining to configure, then call `.run()` to start.
#[derive(Clone, Debug)]
pub struct Simulation {
    config: Config,
    ranks: usize,
    checks: bool,
    output: Option<PathBuf>,
}

impl Simulation {
    /// A run of `config` on four ranks with invariant checks on.
    pub fn new(config: Config) -> Self {
        let output = config.output.clone();
        Self {
            config,
            ranks: 4,
            checks: true,
            output,
        }
    }

    /// Set the number of ranks. Must be a power of 4.
    pub fn with_ranks(mut self, ranks: usize) -> Self {
        self.ranks = ranks;
        self
    }

    /// Enable or disable the per-tick invariant checks.
    pub fn with_checks(mut self, checks: bool) -> Self {
        self.checks = checks;
        self
    }

    /// Write every frame to `path`.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// This rank's share of the run over an existing communicator.
    ///
    /// Collective: every rank of `comm` must call it with the same
    /// configuration. The rank count is `comm.size()`, not `with_ranks`.
    pub fn run_rank<C: Communicator>(&self, comm: &C) -> Result<RankSummary> {
        let writer: Box<dyn FrameWriter> = match &self.output {
            Some(path) => Box::new(SharedFileWriter::create(comm, path)?),
            None => Box::new(NullWriter),
        };
        RankSimulation::new(comm, self.config.clone())?
            .with_writer(writer)
            .with_checks(self.checks)
            .run()
    }

    /// Run the simulation. Blocks until every rank has finished.
    ///
    /// A bad rank count is returned before any rank starts; the caller
    /// reports it.
    pub fn run(self) -> Result<RunSummary> {
        self.config.validate()?;
        if power_of_four_exponent(self.ranks).is_none() {
            return Err(TopologyError::NotPowerOfFour {
                num_ranks: self.ranks,
            }
            .into());
        }

        info!(
            ranks = self.ranks,
            boids = self.config.num_boids,
            ticks = self.config.num_ticks,
            seed = self.config.seed,
            "starting run"
        );

        let results = LocalCluster::new(self.ranks).run(|comm| self.run_rank(comm));

        let summaries = collect_ranks(results)?;
        let root = &summaries[ROOT];
        Ok(RunSummary {
            ranks: self.ranks,
            ticks: root.ticks,
            elapsed: root.elapsed,
            order_parameter: root.order_parameter,
            final_counts: summaries.iter().map(|s| s.final_count).collect(),
        })
    }
}

/// Every rank's value, or the error that brought the run down.
///
/// Errors caused by a peer aborting are only returned when no rank reported
/// a root cause.
fn collect_ranks<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut secondary: Option<FlockError> = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) if err.is_secondary() => {
                secondary.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    match secondary {
        Some(err) => Err(err),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommError, InvariantError};

    #[test]
    fn test_collect_prefers_root_cause() {
        let results: Vec<Result<u32>> = vec![
            Err(CommError::PeerAborted { rank: 2 }.into()),
            Ok(1),
            Err(InvariantError::Conservation {
                tick: 3,
                expected: 4,
                actual: 5,
            }
            .into()),
        ];
        assert!(matches!(
            collect_ranks(results),
            Err(FlockError::Invariant(InvariantError::Conservation { tick: 3, .. }))
        ));

        let only_secondary: Vec<Result<u32>> =
            vec![Ok(1), Err(CommError::PeerAborted { rank: 0 }.into())];
        assert!(collect_ranks(only_secondary).unwrap_err().is_secondary());

        assert_eq!(collect_ranks::<u32>(vec![Ok(1), Ok(2)]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_rejects_non_power_of_four() {
        let err = Simulation::new(Config::default())
            .with_ranks(6)
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            FlockError::Topology(TopologyError::NotPowerOfFour { num_ranks: 6 })
        ));
    }

    #[test]
    fn test_small_run_conserves_boids() {
        let config = Config {
            num_boids: 40,
            num_ticks: 5,
            ..Config::default()
        };
        let summary = Simulation::new(config).with_ranks(4).run().unwrap();
        assert_eq!(summary.ranks, 4);
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.final_counts.len(), 4);
        assert_eq!(summary.total_boids(), 40);
        assert!((0.0..=1.0).contains(&summary.order_parameter));
    }

    #[test]
    fn test_run_rank_over_existing_cluster() {
        let config = Config {
            num_boids: 16,
            num_ticks: 2,
            ..Config::default()
        };
        let sim = Simulation::new(config);
        let results = LocalCluster::new(16).run(|comm| sim.run_rank(comm));
        let total: usize = results
            .into_iter()
            .map(|result| result.unwrap().final_count)
            .sum();
        assert_eq!(total, 16);
    }

    #[test]
    fn test_rank_simulation_tick_report() {
        let config = Config {
            num_boids: 20,
            ..Config::default()
        };
        let results = LocalCluster::new(4).run(|comm| {
            let mut sim = RankSimulation::new(comm, config.clone())?;
            let report = sim.tick(0)?;
            Ok((report, sim.local().len()))
        });
        let mut total = 0;
        for result in results {
            let (report, len) = result.unwrap();
            assert_eq!(report.tick, 0);
            assert_eq!(report.local, len);
            total += len;
        }
        assert_eq!(total, 20);
    }
}
