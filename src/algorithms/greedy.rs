// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
use crate::algorithms::Error;
use crate::Partition;

/// Greedy number partitioning: items are assigned to the currently lightest
/// part in order of decreasing weight. Ignores the adjacency entirely; used
/// to seed the coarsest level of the multilevel pipeline.
#[derive(Clone, Copy, Debug)]
pub struct Greedy {
    /// Number of parts.
    pub part_count: usize,
}

fn greedy_partition(part_ids: &mut [usize], weights: &[i64], part_count: usize) {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_unstable_by_key(|&item| std::cmp::Reverse(weights[item]));

    let mut part_weights = vec![0_i64; part_count];
    for item in order {
        let lightest = (0..part_count)
            .min_by_key(|&part| part_weights[part])
            .unwrap();
        part_ids[item] = lightest;
        part_weights[lightest] += weights[item];
    }
}

impl<'a> Partition<&'a [i64]> for Greedy {
    type Metadata = ();
    type Error = Error;

    fn partition(
        &mut self,
        part_ids: &mut [usize],
        weights: &'a [i64],
    ) -> Result<Self::Metadata, Self::Error> {
        if part_ids.len() != weights.len() {
            return Err(Error::InputLenMismatch {
                expected: part_ids.len(),
                actual: weights.len(),
            });
        }
        if weights.iter().any(|&w| w < 0) {
            return Err(Error::NegativeValues);
        }
        if self.part_count == 0 {
            return Err(Error::NotFound);
        }
        greedy_partition(part_ids, weights, self.part_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balances_uniform_weights() {
        let weights = vec![1_i64; 8];
        let mut part_ids = vec![0; 8];
        Greedy { part_count: 2 }.partition(&mut part_ids, &weights).unwrap();

        let ones = part_ids.iter().filter(|&&p| p == 1).count();
        assert_eq!(ones, 4);
    }

    #[test]
    fn test_heavy_items_spread_first() {
        let weights = vec![7, 5, 3, 1];
        let mut part_ids = vec![0; 4];
        Greedy { part_count: 2 }.partition(&mut part_ids, &weights).unwrap();

        // 7 and (5 + 3 + 1) or (7 + 1) and (5 + 3): either way the heavy
        // items land in different parts
        assert_ne!(part_ids[0], part_ids[1]);
    }

    #[test]
    fn test_rejects_len_mismatch() {
        let weights = vec![1_i64; 3];
        let mut part_ids = vec![0; 4];
        assert!(matches!(
            Greedy { part_count: 2 }.partition(&mut part_ids, &weights),
            Err(Error::InputLenMismatch { .. })
        ));
    }
}
