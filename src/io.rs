use std::fs::File;
use std::io::Write;
use std::path::Path;

use rustc_hash::FxHashMap;
use sprs::io::read_matrix_market;
use sprs::TriMatI;

use crate::config::NodeOrdering;
use crate::graph::builder::GraphBuilder;
use crate::graph::Graph;

/// Reads a Matrix Market file as an undirected graph.
///
/// Entries appearing in both directions are merged (and must agree on the
/// weight); self loops are kept. When `ordering` asks for degree buckets the
/// returned permutation maps original node ids to the new ones.
pub fn read_matrix_market_as_graph(
    file_path: &Path,
    ordering: NodeOrdering,
) -> Result<(Graph, Option<Vec<usize>>), Box<dyn std::error::Error>> {
    // Integer weights are the native format; real-valued files are rounded.
    let (n, triplets) = match read_matrix_market::<i64, usize, _>(file_path) {
        Ok(matrix) => (
            matrix.rows().max(matrix.cols()),
            collect_triplets(&matrix, |w| w),
        ),
        Err(_) => {
            let matrix: TriMatI<f64, usize> = read_matrix_market(file_path)?;
            (
                matrix.rows().max(matrix.cols()),
                collect_triplets(&matrix, |w| w.round() as i64),
            )
        }
    };

    let mut edges: FxHashMap<(usize, usize), i64> = FxHashMap::default();
    let mut builder = GraphBuilder::new(n);
    for (r, c, w) in triplets {
        if r == c {
            builder.add_self_loop(r, w);
            continue;
        }
        let key = (r.min(c), r.max(c));
        match edges.get(&key) {
            None => {
                edges.insert(key, w);
                builder.add_edge(key.0, key.1, w);
            }
            Some(&existing) if existing == w => {}
            Some(_) => return Err(Box::new(crate::algorithms::Error::Asymmetric)),
        }
    }

    match ordering {
        NodeOrdering::Natural => Ok((builder.build()?, None)),
        NodeOrdering::DegBuckets => {
            let (graph, perm) = builder.build_sorted()?;
            Ok((graph, Some(perm)))
        }
        NodeOrdering::ImplicitDegBuckets => Ok((builder.build_implicit_sorted()?, None)),
    }
}

fn collect_triplets<N: Copy>(
    matrix: &TriMatI<N, usize>,
    convert: impl Fn(N) -> i64,
) -> Vec<(usize, usize, i64)> {
    matrix
        .triplet_iter()
        .map(|(&value, (row, col))| (row, col, convert(value)))
        .collect()
}

/// Write the partition array to a file.
pub fn write_partition_data_to_file(
    partition: &[usize],
    file_name: &str,
) -> Result<(), std::io::Error> {
    let mut file = File::create(file_name)?;
    for vertex_id in 0..partition.len() {
        writeln!(file, "vertex {} => partition {}", vertex_id, partition[vertex_id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_mock_file(dir: &Path, filename: &str, content: &str) -> String {
        let file_path = dir.join(filename);
        let mut file = File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_read_matrix_market_integer() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;

        let content = "\
%%MatrixMarket matrix coordinate integer general
%
4 4 6
1 2 3
2 1 3
2 3 1
3 2 1
3 4 2
4 3 2";
        let path = create_mock_file(temp_dir.path(), "int_matrix.mtx", content);

        let (graph, perm) =
            read_matrix_market_as_graph(Path::new(&path), NodeOrdering::Natural)?;
        assert!(perm.is_none());
        assert_eq!(graph.n(), 4);
        assert_eq!(graph.m(), 6);
        assert_eq!(graph.degree(1), 2);
        let adjacency: Vec<(usize, i64)> = graph
            .neighbors(1)
            .map(|(e, v)| (v, graph.edge_weight(e)))
            .collect();
        assert_eq!(adjacency, vec![(0, 3), (2, 1)]);

        Ok(())
    }

    #[test]
    fn test_read_matrix_market_real() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;

        let content = "\
%%MatrixMarket matrix coordinate real general
%
3 3 2
1 2 1.0
2 1 1.0";
        let path = create_mock_file(temp_dir.path(), "real_matrix.mtx", content);

        let (graph, _) = read_matrix_market_as_graph(Path::new(&path), NodeOrdering::Natural)?;
        assert_eq!(graph.n(), 3);
        assert_eq!(graph.m(), 2);

        Ok(())
    }

    #[test]
    fn test_one_sided_entries_are_mirrored() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;

        let content = "\
%%MatrixMarket matrix coordinate integer general
%
3 3 2
1 2 5
2 3 7";
        let path = create_mock_file(temp_dir.path(), "oneside.mtx", content);

        let (graph, _) = read_matrix_market_as_graph(Path::new(&path), NodeOrdering::Natural)?;
        assert_eq!(graph.m(), 4);
        assert_eq!(graph.degree(1), 2);

        Ok(())
    }

    #[test]
    fn test_write_partition() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("partition.txt");

        write_partition_data_to_file(&[0, 1, 0], path.to_str().unwrap())?;
        let written = std::fs::read_to_string(&path)?;
        assert_eq!(
            written,
            "vertex 0 => partition 0\nvertex 1 => partition 1\nvertex 2 => partition 0\n"
        );

        Ok(())
    }
}
