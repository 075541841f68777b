use std::path::Path;
use std::time::Instant;

use kwaycut::algorithms::MultiLevelPartitioner;
use kwaycut::config::{NodeOrdering, PartitionerConfig};
use kwaycut::io::{read_matrix_market_as_graph, write_partition_data_to_file};
use kwaycut::Partition;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: kwaycut <graph.mtx> [k] [epsilon]");
    let k: usize = args.next().map_or(2, |arg| arg.parse().expect("invalid k"));
    let epsilon: f64 = args
        .next()
        .map_or(0.03, |arg| arg.parse().expect("invalid epsilon"));

    let config = PartitionerConfig {
        k,
        epsilon,
        node_ordering: NodeOrdering::DegBuckets,
        ..Default::default()
    };

    let (mut graph, perm) = read_matrix_market_as_graph(Path::new(&path), config.node_ordering)?;
    let mut partition = vec![0; graph.n()];

    let start = Instant::now();
    let report = MultiLevelPartitioner { config }.partition(&mut partition, &mut graph)?;
    let elapsed_time = start.elapsed();

    // report the partition in the caller's node order
    let output: Vec<usize> = match &perm {
        Some(perm) => perm.iter().map(|&new| partition[new]).collect(),
        None => partition,
    };
    write_partition_data_to_file(&output, "partition.txt")?;

    println!("Edge cut {:?}", report.edge_cut);
    println!("Imbalance {:?}", report.imbalance);
    println!("Feasible {:?}", report.feasible);
    println!("Execution time {:?}", elapsed_time);
    Ok(())
}
