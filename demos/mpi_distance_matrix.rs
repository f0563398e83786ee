// mpirun -n 4 target/debug/examples/mpi_distance_matrix prices.csv [max_assets] [batch_size] [result.csv]
//
// Rank 0 loads the CSV, coordinates and writes the pair list; every other
// rank computes DTW distances.
use pairwise_farm::io::{MAX_POINTS, load_series_csv, save_pairs};
use pairwise_farm::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let comm = MpiComm::new()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(csv) = args.first() else {
        if comm.rank() == COORDINATOR {
            eprintln!("usage: mpi_distance_matrix <prices.csv> [max_assets] [batch_size] [output]");
        }
        return Ok(());
    };
    let max_assets: usize = args.get(1).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(20);
    let batch_size: usize = args.get(2).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(4);
    let output = args.get(3).cloned().unwrap_or_else(|| "result.csv".into());

    let config = FarmConfig {
        protocol: ProtocolKind::Packed,
        batch_size,
        ..FarmConfig::default()
    };

    let table = if comm.rank() == COORDINATOR {
        Some(load_series_csv(csv, max_assets, MAX_POINTS)?.into_shared())
    } else {
        None
    };
    let meta = table.as_ref().map(|t| t.meta().to_vec());

    match run_rank(&comm, table, &Dtw::default(), &config)? {
        RankOutcome::Coordinator { matrix, report } => {
            println!(
                "{} distances, {} workers, {} work messages, {:?}",
                matrix.len(),
                report.workers,
                report.work_sent,
                report.elapsed
            );
            save_pairs(&output, &matrix, meta.as_deref().unwrap_or_default())?;
        }
        RankOutcome::Worker(stats) => {
            log::info!("rank {}: {} tasks in {} units", comm.rank(), stats.tasks, stats.units);
        }
    }
    Ok(())
}
