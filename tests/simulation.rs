//! Multi-rank scenarios run end to end over the in-process transport.

use pflock::decomposition::place_boids;
use pflock::flocking::order_parameter;
use pflock::prelude::*;
use pflock::{FlockError, SeededStream, TopologyError};

fn run_ranks<T, F>(ranks: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(&pflock::LocalComm) -> Result<T> + Sync,
{
    LocalCluster::new(ranks)
        .run(body)
        .into_iter()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn test_single_tick_sanity() {
    let config = Config {
        num_boids: 12,
        side_len: 10.0,
        cutoff: 1.0,
        v: 0.03,
        dt: 1.0,
        noise: 0.0,
        ..Config::default()
    };

    let locals = run_ranks(4, |comm| {
        let mut sim = RankSimulation::new(comm, config.clone())?;
        sim.tick(0)?;
        Ok(sim.local().to_vec())
    });

    let total: usize = locals.iter().map(Vec::len).sum();
    assert_eq!(total, 12);
    for (rank, local) in locals.iter().enumerate() {
        let topo = RankTopology::new(rank, 4, 10.0).unwrap();
        for boid in local {
            let p = boid.position;
            assert!((0.0..10.0).contains(&p.x) && (0.0..10.0).contains(&p.y));
            assert_eq!(topo.position_to_rank(p), rank);
        }
    }
}

#[test]
fn test_placement_is_reproducible() {
    let config = Config {
        seed: 42,
        num_boids: 30,
        side_len: 5.0,
        ..Config::default()
    };

    let scatter_once = || {
        run_ranks(4, |comm| {
            let sim = RankSimulation::new(comm, config.clone())?;
            Ok(sim.local().to_vec())
        })
    };
    let first = scatter_once();
    let second = scatter_once();
    assert_eq!(first, second);
    assert_eq!(first.iter().map(Vec::len).sum::<usize>(), 30);

    let topo = RankTopology::new(0, 4, 5.0).unwrap();
    let placed = place_boids(&config, &topo, &mut SeededStream::placement(42));
    assert_eq!(first, placed);
}

#[test]
fn test_different_seeds_differ() {
    let placed = |seed| {
        let config = Config {
            seed,
            ..Config::default()
        };
        let topo = RankTopology::new(0, 4, config.side_len).unwrap();
        place_boids(&config, &topo, &mut SeededStream::placement(seed))
    };
    assert_ne!(placed(1), placed(2));
}

#[test]
fn test_boundary_crossing_wraps_to_new_owner() {
    let config = Config {
        num_boids: 1,
        side_len: 5.0,
        v: 0.03,
        dt: 1.0,
        noise: 0.0,
        ..Config::default()
    };

    let locals = run_ranks(4, |comm| {
        let local = if comm.rank() == 3 {
            vec![Boid::new(Vec2d::new(4.99, 2.5), Vec2d::new(0.03, 0.0), 0)]
        } else {
            Vec::new()
        };
        let mut sim = RankSimulation::with_boids(comm, config.clone(), local)?;
        let report = sim.tick(0)?;
        Ok((report, sim.local().to_vec()))
    });

    for (rank, (report, local)) in locals.iter().enumerate() {
        if rank == 2 {
            assert_eq!(local.len(), 1);
            assert_eq!(local[0].id, 0);
            assert!((local[0].position.x - 0.02).abs() < 1e-9);
            assert!((local[0].position.y - 2.5).abs() < 1e-12);
            assert_eq!(report.migration.received, 1);
        } else {
            assert!(local.is_empty(), "rank {rank} kept a copy");
        }
    }
    assert_eq!(locals[3].0.migration.sent, 1);
}

#[test]
fn test_boid_on_inexact_tile_edge_stays_put() {
    let config = Config {
        num_boids: 1,
        side_len: 0.7,
        v: 0.001,
        dt: 1.0,
        noise: 0.0,
        cutoff: 0.1,
        ..Config::default()
    };
    let start = Vec2d::new(3.0 * 0.175, 0.0875);
    let owner = RankTopology::new(0, 16, 0.7).unwrap().position_to_rank(start);
    assert_eq!(owner, 3);

    let locals = run_ranks(16, |comm| {
        let local = if comm.rank() == owner {
            vec![Boid::new(start, Vec2d::new(0.0, 0.001), 0)]
        } else {
            Vec::new()
        };
        let mut sim = RankSimulation::with_boids(comm, config.clone(), local)?;
        let report = sim.tick(0)?;
        Ok((report, sim.local().to_vec()))
    });

    for (rank, (report, local)) in locals.iter().enumerate() {
        assert_eq!(report.migration.sent, 0);
        if rank == owner {
            assert_eq!(local.len(), 1);
            assert_eq!(local[0].position.x, start.x);
            assert!((local[0].position.y - 0.0885).abs() < 1e-12);
        } else {
            assert!(local.is_empty(), "rank {rank} received the boid");
        }
    }
}

#[test]
fn test_invariants_hold_on_sixteen_ranks() {
    let config = Config {
        seed: 7,
        num_boids: 400,
        side_len: 12.0,
        noise: 2.0,
        v: 0.3,
        ..Config::default()
    };

    let counts = run_ranks(16, |comm| {
        let mut sim = RankSimulation::new(comm, config.clone())?;
        let mut moved = 0;
        for tick in 0..20 {
            let report = sim.tick(tick)?;
            moved += report.migration.sent;
            assert!((0.0..=1.0).contains(&report.order_parameter));
        }
        let topo = sim.topology();
        assert!(sim
            .local()
            .iter()
            .all(|b| topo.position_to_rank(b.position) == topo.rank()));
        Ok((sim.local().len(), moved))
    });

    assert_eq!(counts.iter().map(|(n, _)| n).sum::<usize>(), 400);
    assert!(counts.iter().map(|(_, m)| m).sum::<usize>() > 0);
}

#[test]
fn test_aligned_flock_has_unit_order() {
    let config = Config {
        num_boids: 8,
        side_len: 8.0,
        noise: 0.0,
        ..Config::default()
    };

    let orders = run_ranks(4, |comm| {
        let rank = comm.rank() as u64;
        let local: Vec<Boid> = (0..2)
            .map(|i| {
                let topo = RankTopology::new(comm.rank(), 4, 8.0).expect("valid grid");
                let b = topo.tile_bounds();
                Boid::new(
                    Vec2d::new(b.xmin + 1.0 + i as f64, b.ymin + 1.0),
                    Vec2d::new(0.0, 0.03),
                    rank * 2 + i,
                )
            })
            .collect();
        order_parameter(comm, &local, &config)
    });
    for order in orders {
        assert!((order - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_full_run_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.txt");
    let config = Config {
        num_boids: 25,
        num_ticks: 3,
        ..Config::default()
    };

    let summary = Simulation::new(config)
        .with_ranks(4)
        .with_output(&path)
        .run()
        .unwrap();
    assert_eq!(summary.total_boids(), 25);
    assert_eq!(summary.ticks, 3);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 75);
    for tick in 0..3u64 {
        let mut ids: Vec<u64> = text
            .lines()
            .filter(|line| line.split(' ').next() == Some(tick.to_string().as_str()))
            .map(|line| line.split(' ').nth(1).unwrap().parse().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..25).collect::<Vec<_>>());
    }
}

#[test]
fn test_checks_can_be_disabled() {
    let summary = Simulation::new(Config::default())
        .with_ranks(1)
        .with_checks(false)
        .run()
        .unwrap();
    assert_eq!(summary.final_counts, vec![30]);
}

#[test]
fn test_non_power_of_four_is_rejected() {
    for ranks in [0, 2, 3, 8, 12] {
        let err = Simulation::new(Config::default())
            .with_ranks(ranks)
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            FlockError::Topology(TopologyError::NotPowerOfFour { .. })
        ));
    }
}

#[test]
fn test_direct_rank_setup_rejects_bad_grid() {
    let results =
        LocalCluster::new(2).run(|comm| RankSimulation::new(comm, Config::default()).map(|_| ()));
    for result in results {
        assert!(matches!(
            result,
            Err(FlockError::Topology(TopologyError::NotPowerOfFour { num_ranks: 2 }))
        ));
    }
}
