mod util;
use util::*;

use pairwise_farm::prelude::*;
use pairwise_farm::protocol::ProtocolKind;

fn config(protocol: ProtocolKind, batch_size: usize, workers: usize) -> FarmConfig {
    FarmConfig {
        protocol,
        batch_size,
        workers,
        block: Block::full(),
    }
}

#[test]
fn dtw_example_matches_known_distances() {
    let table = example_table();
    let out = run_local(table, &Dtw::default(), &config(ProtocolKind::Packed, 4, 2)).unwrap();
    let m = &out.matrix;
    assert_eq!(m.len(), 15);
    let close = |a: f64, b: f64| (a - b).abs() < 1e-12;
    assert!(close(m.get(0, 1).unwrap(), 2f64.sqrt()));
    assert!(close(m.get(0, 2).unwrap(), 5f64.sqrt()));
    assert!(close(m.get(1, 2).unwrap(), 3f64.sqrt()));
    // series 0/3 and 2/5 are identical
    assert_eq!(m.get(0, 3), Some(0.0));
    assert_eq!(m.get(2, 5), Some(0.0));
}

#[test]
fn single_worker_matches_serial() {
    let table = random_table(4, 16, 7);
    let serial = serial_distance_matrix(&table, &Dtw::default(), Block::full()).unwrap();
    let out = run_local(table, &Dtw::default(), &config(ProtocolKind::Singleton, 1, 1)).unwrap();
    assert_eq!(out.matrix, serial);
    assert_eq!(out.report.tasks, 6);
    assert_eq!(out.report.work_sent, 6);
    assert_eq!(out.report.terminates_sent, 1);
    assert_eq!(out.workers[0].tasks, 6);
}

#[test]
fn batch_size_does_not_change_the_matrix() {
    let table = random_table(6, 12, 11);
    let one =
        run_local(table.clone(), &Dtw::default(), &config(ProtocolKind::Packed, 1, 2)).unwrap();
    let three = run_local(table, &Dtw::default(), &config(ProtocolKind::Packed, 3, 2)).unwrap();
    assert_eq!(one.matrix, three.matrix);
    assert_eq!(one.report.work_sent, 15);
    assert_eq!(three.report.work_sent, 5);
    assert_eq!(three.report.results_received, 5);
}

#[test]
fn all_protocols_agree() {
    let table = random_table(9, 10, 3);
    let dist = Dtw::with_window(3);
    let expected = serial_distance_matrix(&table, &dist, Block::full()).unwrap();
    for protocol in [
        Protocol::Singleton,
        Protocol::Inline,
        Protocol::Packed { batch_size: 4 },
        Protocol::Packed { batch_size: 100 },
    ] {
        let out = run_local_with(table.clone(), &dist, protocol, 3).unwrap();
        assert_eq!(out.matrix, expected, "{protocol:?}");
    }
}

#[test]
fn one_terminate_per_worker_and_balanced_counts() {
    let table = ramp_table(10);
    let out = run_local(table, &first_point_gap, &config(ProtocolKind::Packed, 2, 4)).unwrap();
    let r = &out.report;
    assert_eq!(r.workers, 4);
    assert_eq!(r.terminates_sent, 4);
    assert_eq!(r.per_worker.iter().sum::<usize>(), 45);
    assert_eq!(out.workers.iter().map(|w| w.tasks).sum::<usize>(), 45);
    assert_eq!(out.workers.iter().map(|w| w.units).sum::<usize>(), r.work_sent);
    assert_eq!(r.phases.first(), Some(&Phase::DistributingInitial));
    assert!(r.phases.contains(&Phase::Draining));
    assert_eq!(r.phases.last(), Some(&Phase::Done));
    assert!(r.phases.len() <= 5);
    for i in 0..10 {
        for j in (i + 1)..10 {
            assert_eq!(out.matrix.get_distance(j, i), Some((j - i) as f64));
        }
    }
}

#[test]
fn phases_are_recorded_once_per_kind() {
    // 435 single-task units
    let table = ramp_table(30);
    let out = run_local(table, &first_point_gap, &config(ProtocolKind::Packed, 1, 2)).unwrap();
    assert_eq!(out.report.results_received, 435);
    assert_eq!(
        out.report.phases,
        vec![
            Phase::DistributingInitial,
            Phase::AwaitingResult,
            Phase::DistributingNext,
            Phase::Draining,
            Phase::Done,
        ]
    );
    assert!(out.report.elapsed > std::time::Duration::ZERO);
}

#[test]
fn more_workers_than_tasks() {
    // 3 series → 3 tasks, 5 workers: two are terminated straight away
    let table = ramp_table(3);
    let out = run_local(table, &first_point_gap, &config(ProtocolKind::Inline, 1, 5)).unwrap();
    assert_eq!(out.matrix.as_slice(), &[1.0, 2.0, 1.0]);
    assert_eq!(out.report.work_sent, 3);
    assert_eq!(out.report.terminates_sent, 5);
    assert_eq!(out.workers.iter().filter(|w| w.units == 0).count(), 2);
}

#[test]
fn degenerate_block_sends_no_work() {
    let table = ramp_table(6);
    let cfg = FarmConfig {
        block: Block::triangular(4..4, 0..6),
        ..config(ProtocolKind::Packed, 4, 2)
    };
    let out = run_local(table, &first_point_gap, &cfg).unwrap();
    assert!(out.matrix.is_empty());
    assert_eq!(out.report.work_sent, 0);
    assert_eq!(out.report.terminates_sent, 2);
}

#[test]
fn rectangular_block_is_row_major() {
    let table = ramp_table(6);
    let cfg = FarmConfig {
        block: Block::rectangular(0..2, 3..6),
        ..config(ProtocolKind::Packed, 2, 2)
    };
    let out = run_local(table, &first_point_gap, &cfg).unwrap();
    assert_eq!(out.matrix.as_slice(), &[3.0, 4.0, 5.0, 2.0, 3.0, 4.0]);
}

#[test]
fn block_outside_table_fails_before_sending() {
    let table = ramp_table(4);
    let cfg = FarmConfig {
        block: Block::triangular(0..9, 0..9),
        ..config(ProtocolKind::Packed, 2, 2)
    };
    let err = run_local(table, &first_point_gap, &cfg).unwrap_err();
    assert!(matches!(err, FarmError::InvalidBlock(_)));
}

#[test]
fn run_rank_with_table_broadcast() {
    let table = random_table(5, 8, 21);
    let dist = Dtw::default();
    let cfg = config(ProtocolKind::Singleton, 1, 0);
    let expected = serial_distance_matrix(&table, &dist, Block::full()).unwrap();

    let mut comms = LocalComm::world(3);
    let root = comms.remove(0);
    let (d, c) = (&dist, &cfg);
    let outcome = std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || run_rank(&comm, None, d, c)))
            .collect();
        let root_outcome = run_rank(&root, Some(table.clone()), &dist, &cfg).unwrap();
        for h in handles {
            match h.join().unwrap().unwrap() {
                RankOutcome::Worker(stats) => assert_eq!(stats.ignored, 0),
                other => panic!("worker rank returned {other:?}"),
            }
        }
        root_outcome
    });
    match outcome {
        RankOutcome::Coordinator { matrix, report } => {
            assert_eq!(matrix, expected);
            assert_eq!(report.terminates_sent, 2);
        }
        other => panic!("root returned {other:?}"),
    }
}

#[test]
fn run_rank_failure_releases_workers() {
    let table = ramp_table(4);
    // singleton workers wait for the table, packed ones for their first unit
    for kind in [ProtocolKind::Singleton, ProtocolKind::Packed] {
        let cfg = FarmConfig {
            block: Block::triangular(0..9, 0..9),
            ..config(kind, 2, 0)
        };
        let mut comms = LocalComm::world(3);
        let root = comms.remove(0);
        let c = &cfg;
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || run_rank(&comm, None, &first_point_gap, c)))
                .collect();
            let err = run_rank(&root, Some(table.clone()), &first_point_gap, &cfg).unwrap_err();
            assert!(matches!(err, FarmError::InvalidBlock(_)), "{kind:?}: {err:?}");
            for h in handles {
                match h.join().unwrap().unwrap() {
                    RankOutcome::Worker(stats) => assert_eq!(stats.tasks, 0),
                    other => panic!("worker rank returned {other:?}"),
                }
            }
        });
    }
}

#[test]
fn config_from_json() {
    let cfg: FarmConfig = serde_json::from_str(
        r#"{ "protocol": "inline", "workers": 2,
             "block": { "row_begin": 0, "row_end": 3, "col_begin": 0, "col_end": 0, "triangular": true } }"#,
    )
    .unwrap();
    assert_eq!(cfg.protocol, ProtocolKind::Inline);
    assert_eq!(cfg.batch_size, FarmConfig::default().batch_size);
    let out = run_local(ramp_table(5), &first_point_gap, &cfg).unwrap();
    // rows 0..3 of a 5-series triangle: 4 + 3 + 2 pairs
    assert_eq!(out.matrix.len(), 9);
}

#[cfg(feature = "mpi-support")]
#[test]
#[serial_test::serial]
fn mpi_single_rank_smoke() {
    let comm = MpiComm::new().unwrap();
    assert!(comm.size() >= 1);
    let cfg = FarmConfig {
        block: Block::triangular(2..2, 0..4),
        ..config(ProtocolKind::Packed, 2, 0)
    };
    let table = (comm.rank() == COORDINATOR).then(|| ramp_table(4));
    match run_rank(&comm, table, &first_point_gap, &cfg).unwrap() {
        RankOutcome::Coordinator { matrix, .. } => assert!(matrix.is_empty()),
        RankOutcome::Worker(stats) => assert_eq!(stats.tasks, 0),
    }
}
