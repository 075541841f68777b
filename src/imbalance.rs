// Standalone imbalance helpers for partitions given as plain arrays; the
// refiners use the bookkeeping on PartitionedGraph instead.

/// Calculates the total weight of each part of a given partition.
pub fn compute_parts_load(partition: &[usize], num_parts: usize, weights: &[i64]) -> Vec<i64> {
    debug_assert_eq!(partition.len(), weights.len());

    let mut loads = vec![0_i64; num_parts];
    for (&part, &weight) in partition.iter().zip(weights) {
        if part < num_parts {
            loads[part] += weight;
        }
    }
    loads
}

/// Compute the imbalance of the given partition: the largest relative
/// deviation of a part load above the ideal `total / num_parts`.
pub fn imbalance(num_parts: usize, partition: &[usize], weights: &[i64]) -> f64 {
    if num_parts == 0 {
        return 0.0;
    }

    let part_loads = compute_parts_load(partition, num_parts, weights);
    let total_weight: i64 = part_loads.iter().sum();

    let ideal_part_weight = total_weight as f64 / num_parts as f64;
    if ideal_part_weight == 0.0 {
        return 0.0;
    }

    part_loads
        .into_iter()
        .map(|part_weight| (part_weight as f64 - ideal_part_weight) / ideal_part_weight)
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use approx::assert_ulps_eq;

    use crate::imbalance::{compute_parts_load, imbalance};

    #[test]
    fn test_compute_parts_load() {
        let partition = [0, 0, 1, 1];
        let vtx_weights = [4_i64, 7, 5, 2];

        let partition_weights = compute_parts_load(&partition, 2, &vtx_weights);

        assert_eq!(partition_weights, vec![11, 7]);
    }

    #[test]
    fn test_imbalance() {
        let partition = [0, 0, 1, 1];
        let vtx_weights = [3_i64, 3, 2, 2];

        let imb = imbalance(2, &partition, &vtx_weights);

        assert_ulps_eq!(imb, 0.2);
    }

    #[test]
    fn test_balanced_partition_has_no_imbalance() {
        let partition = [0, 1, 0, 1];
        let vtx_weights = [2_i64, 2, 2, 2];

        assert_ulps_eq!(imbalance(2, &partition, &vtx_weights), 0.0);
    }
}
