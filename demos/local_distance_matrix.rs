// cargo run --example local_distance_matrix -- [prices.csv] [max_assets] [batch_size] [workers]
//
// Without a CSV the six DTW sample series are used. Prints the pair list
// and a two-cluster k-medoids grouping with its `Ticker,Cluster` labels.
use pairwise_farm::cluster::{self, Algorithm};
use pairwise_farm::io::{MAX_POINTS, load_series_csv, write_cluster_labels, write_pairs};
use pairwise_farm::prelude::*;

fn sample_table() -> SequenceTable {
    SequenceTable::new(vec![
        vec![0., 0., 1., 2., 1., 0., 1., 0., 0.],
        vec![0., 1., 2., 0., 0., 0., 0., 0., 0.],
        vec![1., 2., 0., 0., 0., 0., 0., 1., 1.],
        vec![0., 0., 1., 2., 1., 0., 1., 0., 0.],
        vec![0., 1., 2., 0., 0., 1., 0., 0., 0.],
        vec![1., 2., 0., 0., 0., 0., 0., 1., 1.],
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let max_assets: usize = args.get(1).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(20);
    let batch_size: usize = args.get(2).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(4);

    let table = match args.first() {
        Some(path) => load_series_csv(path, max_assets, MAX_POINTS)?,
        None => sample_table(),
    };
    let config = FarmConfig {
        batch_size,
        workers: match args.get(3) {
            Some(w) => w.parse::<usize>()?,
            None => FarmConfig::default().workers,
        },
        ..FarmConfig::default()
    };
    let meta = table.meta().to_vec();
    let n = table.len();

    let out = run_local(table.into_shared(), &Dtw::default(), &config)?;
    eprintln!(
        "{} distances over {} workers in {:?} ({} work messages)",
        out.matrix.len(),
        out.report.workers,
        out.report.elapsed,
        out.report.work_sent
    );
    write_pairs(std::io::stdout().lock(), &out.matrix, &meta)?;

    if n > 2 {
        let c = cluster::run(n, &out.matrix, &meta, Algorithm::KMedoids { k: 2, max_iter: 100 })?;
        for (label, members) in c.named_groups(&meta).iter().enumerate() {
            println!("cluster {label}: {}", members.join(", "));
        }
        write_cluster_labels(std::io::stdout().lock(), &c, &meta)?;
    }
    Ok(())
}
