//! Compressed CSR representation.
//!
//! Adjacency lists are stored as a byte stream per node:
//!
//! ```text
//! node entry := header [first_edge] body
//! header     := varint(degree << 1 | interval_flag)
//! body       := part*   (degree >= HIGH_DEGREE_THRESHOLD)
//!             | block   (otherwise)
//! part       := varint(part_len) block
//! block      := [varint(num_runs) run*] gaps
//! run        := start varint(len - MIN_INTERVAL_LENGTH)
//! ```
//!
//! Unsigned integers use a 7-bit continuation encoding (MSB set means more
//! bytes follow), signed integers a zig-zag mapping. Within a block, runs of
//! at least [`MIN_INTERVAL_LENGTH`] consecutive neighbor ids are pulled to the
//! front as (start, length) pairs; the first run start is a signed gap against
//! the node id, later starts are unsigned gaps against the previous run end.
//! The remaining neighbors follow gap-coded: the first as a signed gap against
//! the node id, the rest as unsigned gaps against the previous neighbor.
//!
//! Decoding therefore yields interval members first; edge weights are kept in
//! a dense side array indexed by this decode order.

use rayon::prelude::*;

use super::{Csr, DegreeBuckets};

/// Nodes with at least this degree are split into fixed-size parts.
pub const HIGH_DEGREE_THRESHOLD: usize = 10_000;
/// Number of neighbors per high-degree part.
pub const HIGH_DEGREE_PART_LENGTH: usize = 1_000;
/// Minimum length of a run of consecutive ids worth interval-encoding.
pub const MIN_INTERVAL_LENGTH: usize = 4;

// Nodes per parallel encoding chunk.
const ENCODE_CHUNK: usize = 4_096;

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn read_varint(bytes: &[u8], pos: &mut usize) -> u64 {
    let mut value = 0_u64;
    let mut shift = 0;
    loop {
        let byte = bytes[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
    }
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_signed_varint(out: &mut Vec<u8>, value: i64) {
    write_varint(out, zigzag_encode(value));
}

fn read_signed_varint(bytes: &[u8], pos: &mut usize) -> i64 {
    zigzag_decode(read_varint(bytes, pos))
}

/// Bit-packed array of unsigned integers with a fixed width chosen from the
/// largest stored value.
pub struct CompactArray {
    width: u32,
    words: Vec<u64>,
    len: usize,
}

impl CompactArray {
    pub fn from_values(values: &[usize]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0) as u64;
        let width = (64 - max.leading_zeros()).max(1);

        let bits = values.len() * width as usize;
        let mut words = vec![0_u64; bits.div_ceil(64) + 1];
        for (i, &value) in values.iter().enumerate() {
            let offset = i * width as usize;
            let word = offset / 64;
            let shift = offset % 64;
            words[word] |= (value as u64) << shift;
            if shift + width as usize > 64 {
                words[word + 1] |= (value as u64) >> (64 - shift);
            }
        }

        Self {
            width,
            words,
            len: values.len(),
        }
    }

    pub fn get(&self, i: usize) -> usize {
        debug_assert!(i < self.len);
        let width = self.width as usize;
        let offset = i * width;
        let word = offset / 64;
        let shift = offset % 64;

        let mut value = self.words[word] >> shift;
        if shift + width > 64 {
            value |= self.words[word + 1] << (64 - shift);
        }
        let mask = if width == 64 { u64::MAX } else { (1 << width) - 1 };
        (value & mask) as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the packed data in bytes.
    pub fn memory(&self) -> usize {
        self.words.len() * 8
    }
}

#[derive(Default)]
struct EncodeStats {
    high_degree_nodes: usize,
    high_degree_parts: usize,
    interval_nodes: usize,
    intervals: usize,
}

// Maximal runs of consecutive ids with length >= MIN_INTERVAL_LENGTH, as
// (start index in `adjacency`, length) pairs.
fn find_runs(adjacency: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut begin = 0;
    for i in 1..=adjacency.len() {
        if i == adjacency.len() || adjacency[i] != adjacency[i - 1] + 1 {
            if i - begin >= MIN_INTERVAL_LENGTH {
                runs.push((begin, i - begin));
            }
            begin = i;
        }
    }
    runs
}

fn encode_block(
    out: &mut Vec<u8>,
    u: usize,
    adjacency: &[usize],
    weights: Option<&[i64]>,
    weights_out: &mut Vec<i64>,
    has_intervals: bool,
    stats: &mut EncodeStats,
) {
    let runs = find_runs(adjacency);

    if has_intervals {
        write_varint(out, runs.len() as u64);
        let mut prev_end: Option<usize> = None;
        for &(begin, len) in &runs {
            let start = adjacency[begin];
            match prev_end {
                None => write_signed_varint(out, start as i64 - u as i64),
                Some(end) => write_varint(out, (start - end) as u64),
            }
            write_varint(out, (len - MIN_INTERVAL_LENGTH) as u64);
            prev_end = Some(start + len);
        }
        stats.intervals += runs.len();
    } else {
        debug_assert!(runs.is_empty());
    }

    let mut in_run = vec![false; adjacency.len()];
    for &(begin, len) in &runs {
        in_run[begin..begin + len].iter_mut().for_each(|x| *x = true);
    }

    let mut prev: Option<usize> = None;
    for (i, &v) in adjacency.iter().enumerate() {
        if in_run[i] {
            continue;
        }
        match prev {
            None => write_signed_varint(out, v as i64 - u as i64),
            Some(prev) => write_varint(out, (v - prev) as u64),
        }
        prev = Some(v);
    }

    // Edge weights are reordered into decode order: run members first.
    if let Some(weights) = weights {
        weights_out.extend(
            in_run
                .iter()
                .zip(weights)
                .filter(|(in_run, _)| **in_run)
                .map(|(_, &w)| w),
        );
        weights_out.extend(
            in_run
                .iter()
                .zip(weights)
                .filter(|(in_run, _)| !**in_run)
                .map(|(_, &w)| w),
        );
    }
}

fn encode_adjacency(
    out: &mut Vec<u8>,
    u: usize,
    first_edge: usize,
    adjacency: &[usize],
    weights: Option<&[i64]>,
    weights_out: &mut Vec<i64>,
    stats: &mut EncodeStats,
) {
    let degree = adjacency.len();
    debug_assert!(adjacency.windows(2).all(|w| w[0] < w[1]));

    if degree == 0 {
        write_varint(out, 0);
        return;
    }

    let high_degree = degree >= HIGH_DEGREE_THRESHOLD;
    let blocks: Vec<&[usize]> = if high_degree {
        adjacency.chunks(HIGH_DEGREE_PART_LENGTH).collect()
    } else {
        vec![adjacency]
    };

    let has_intervals = blocks.iter().any(|block| !find_runs(block).is_empty());

    write_varint(out, ((degree as u64) << 1) | has_intervals as u64);
    write_varint(out, first_edge as u64);

    if high_degree {
        stats.high_degree_nodes += 1;
        stats.high_degree_parts += blocks.len();
    }
    if has_intervals {
        stats.interval_nodes += 1;
    }

    let mut consumed = 0;
    for block in blocks {
        if high_degree {
            write_varint(out, block.len() as u64);
        }
        let block_weights = weights.map(|w| &w[consumed..consumed + block.len()]);
        encode_block(out, u, block, block_weights, weights_out, has_intervals, stats);
        consumed += block.len();
    }
}

/// Compressed CSR graph; see the module docs for the encoding.
pub struct CompressedCsr {
    offsets: CompactArray,
    compressed_edges: Vec<u8>,
    node_weights: Option<Vec<i64>>,
    edge_weights: Option<Vec<i64>>,
    n: usize,
    m: usize,
    total_node_weight: i64,
    sorted: bool,
    buckets: DegreeBuckets,
    num_high_degree_nodes: usize,
    num_interval_nodes: usize,
}

impl CompressedCsr {
    pub fn from_csr(csr: &Csr) -> Self {
        let n = csr.n();
        let chunks: Vec<(Vec<u8>, Vec<usize>, Vec<i64>, EncodeStats)> = (0..n)
            .step_by(ENCODE_CHUNK)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|begin| {
                let end = (begin + ENCODE_CHUNK).min(n);
                let mut bytes = Vec::new();
                let mut local_offsets = Vec::with_capacity(end - begin);
                let mut weights_out = Vec::new();
                let mut stats = EncodeStats::default();
                for u in begin..end {
                    local_offsets.push(bytes.len());
                    encode_adjacency(
                        &mut bytes,
                        u,
                        csr.first_edge(u),
                        csr.raw_adjacency(u),
                        csr.edge_weights().map(|w| {
                            &w[csr.first_edge(u)..csr.first_edge(u) + csr.degree(u)]
                        }),
                        &mut weights_out,
                        &mut stats,
                    );
                }
                (bytes, local_offsets, weights_out, stats)
            })
            .collect();

        let mut compressed_edges = Vec::new();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut edge_weights = csr.edge_weights().map(|_| Vec::with_capacity(csr.m()));
        let mut stats = EncodeStats::default();
        for (bytes, local_offsets, weights_out, chunk_stats) in chunks {
            let base = compressed_edges.len();
            offsets.extend(local_offsets.into_iter().map(|offset| base + offset));
            compressed_edges.extend_from_slice(&bytes);
            if let Some(edge_weights) = &mut edge_weights {
                edge_weights.extend(weights_out);
            }
            stats.high_degree_nodes += chunk_stats.high_degree_nodes;
            stats.high_degree_parts += chunk_stats.high_degree_parts;
            stats.interval_nodes += chunk_stats.interval_nodes;
            stats.intervals += chunk_stats.intervals;
        }
        offsets.push(compressed_edges.len());

        Self {
            offsets: CompactArray::from_values(&offsets),
            compressed_edges,
            node_weights: csr.node_weights().map(<[i64]>::to_vec),
            edge_weights,
            n,
            m: csr.m(),
            total_node_weight: csr.total_node_weight,
            sorted: csr.sorted,
            buckets: csr.buckets.clone(),
            num_high_degree_nodes: stats.high_degree_nodes,
            num_interval_nodes: stats.interval_nodes,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn degree(&self, u: usize) -> usize {
        let mut pos = self.offsets.get(u);
        (read_varint(&self.compressed_edges, &mut pos) >> 1) as usize
    }

    pub fn neighbors(&self, u: usize) -> CompressedNeighbors<'_> {
        CompressedNeighbors::new(&self.compressed_edges, self.offsets.get(u), u)
    }

    pub fn node_weight(&self, u: usize) -> i64 {
        self.node_weights.as_ref().map_or(1, |weights| weights[u])
    }

    pub fn edge_weight(&self, e: usize) -> i64 {
        self.edge_weights.as_ref().map_or(1, |weights| weights[e])
    }

    pub fn total_node_weight(&self) -> i64 {
        self.total_node_weight
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn buckets(&self) -> &DegreeBuckets {
        &self.buckets
    }

    pub fn num_high_degree_nodes(&self) -> usize {
        self.num_high_degree_nodes
    }

    pub fn num_interval_nodes(&self) -> usize {
        self.num_interval_nodes
    }

    /// Compressed size in bytes, including the offset array.
    pub fn memory(&self) -> usize {
        self.compressed_edges.len() + self.offsets.memory()
    }

    pub(super) fn restrict(&mut self, count: usize) {
        self.n -= count;
        self.update_total_node_weight();
    }

    pub(super) fn unrestrict(&mut self) {
        self.n = self.offsets.len() - 1;
        self.update_total_node_weight();
    }

    fn update_total_node_weight(&mut self) {
        self.total_node_weight = match &self.node_weights {
            Some(weights) => weights[..self.n].par_iter().sum(),
            None => self.n as i64,
        };
    }
}

/// Lazy decoder over one node's compressed adjacency, yielding
/// `(edge_id, neighbor)` pairs.
pub struct CompressedNeighbors<'a> {
    bytes: &'a [u8],
    pos: usize,
    u: usize,
    remaining: usize,
    edge: usize,
    high_degree: bool,
    has_intervals: bool,
    block_remaining: usize,
    runs_left: usize,
    run_value: usize,
    run_left: usize,
    prev_run_end: usize,
    first_run_in_block: bool,
    gap_prev: usize,
    first_gap_in_block: bool,
}

impl<'a> CompressedNeighbors<'a> {
    fn new(bytes: &'a [u8], offset: usize, u: usize) -> Self {
        let mut pos = offset;
        let header = read_varint(bytes, &mut pos);
        let degree = (header >> 1) as usize;
        let has_intervals = header & 1 != 0;
        let edge = if degree > 0 {
            read_varint(bytes, &mut pos) as usize
        } else {
            0
        };

        Self {
            bytes,
            pos,
            u,
            remaining: degree,
            edge,
            high_degree: degree >= HIGH_DEGREE_THRESHOLD,
            has_intervals,
            block_remaining: 0,
            runs_left: 0,
            run_value: 0,
            run_left: 0,
            prev_run_end: 0,
            first_run_in_block: true,
            gap_prev: 0,
            first_gap_in_block: true,
        }
    }

    fn start_block(&mut self) {
        self.block_remaining = if self.high_degree {
            read_varint(self.bytes, &mut self.pos) as usize
        } else {
            self.remaining
        };
        self.runs_left = if self.has_intervals {
            read_varint(self.bytes, &mut self.pos) as usize
        } else {
            0
        };
        self.run_left = 0;
        self.first_run_in_block = true;
        self.first_gap_in_block = true;
    }

    fn next_run(&mut self) {
        let start = if self.first_run_in_block {
            self.first_run_in_block = false;
            (self.u as i64 + read_signed_varint(self.bytes, &mut self.pos)) as usize
        } else {
            self.prev_run_end + read_varint(self.bytes, &mut self.pos) as usize
        };
        let len = MIN_INTERVAL_LENGTH + read_varint(self.bytes, &mut self.pos) as usize;
        self.prev_run_end = start + len;
        self.run_value = start;
        self.run_left = len;
        self.runs_left -= 1;
    }
}

impl Iterator for CompressedNeighbors<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        if self.remaining == 0 {
            return None;
        }
        if self.block_remaining == 0 {
            self.start_block();
        }

        let v = if self.run_left > 0 || self.runs_left > 0 {
            if self.run_left == 0 {
                self.next_run();
            }
            let v = self.run_value;
            self.run_value += 1;
            self.run_left -= 1;
            v
        } else if self.first_gap_in_block {
            self.first_gap_in_block = false;
            let v = (self.u as i64 + read_signed_varint(self.bytes, &mut self.pos)) as usize;
            self.gap_prev = v;
            v
        } else {
            let v = self.gap_prev + read_varint(self.bytes, &mut self.pos) as usize;
            self.gap_prev = v;
            v
        };

        self.block_remaining -= 1;
        self.remaining -= 1;
        let e = self.edge;
        self.edge += 1;
        Some((e, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::Graph;
    use proptest::prelude::*;

    fn compress(builder: GraphBuilder) -> CompressedCsr {
        match builder.build().unwrap() {
            Graph::Csr(csr) => CompressedCsr::from_csr(&csr),
            Graph::Compressed(_) => unreachable!(),
        }
    }

    #[test]
    fn test_varint_round_trip() {
        let values = [0_u64, 1, 127, 128, 300, 16_383, 16_384, u64::MAX];
        let mut bytes = Vec::new();
        for &value in &values {
            write_varint(&mut bytes, value);
        }
        let mut pos = 0;
        for &value in &values {
            assert_eq!(read_varint(&bytes, &mut pos), value);
        }
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn test_zigzag_round_trip() {
        for value in [0_i64, -1, 1, -2, 2, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }

    #[test]
    fn test_compact_array_packing() {
        let values = [5_usize, 0, 1023, 7, 512, 1];
        let array = CompactArray::from_values(&values);
        for (i, &value) in values.iter().enumerate() {
            assert_eq!(array.get(i), value);
        }
    }

    #[test]
    fn test_interval_run_then_gaps() {
        // Node 5 with sorted neighbors [5, 6, 7, 8, 9, 20, 21]: one run of
        // length five, then the two stragglers gap-coded.
        let mut builder = GraphBuilder::new(22);
        for &v in &[6_usize, 7, 8, 9, 20, 21] {
            builder.add_edge(5, v, 1);
        }
        builder.add_self_loop(5, 1);

        let compressed = compress(builder);
        assert_eq!(compressed.degree(5), 7);
        assert_eq!(compressed.num_interval_nodes(), 1);

        let decoded: Vec<usize> = compressed.neighbors(5).map(|(_, v)| v).collect();
        assert_eq!(decoded, vec![5, 6, 7, 8, 9, 20, 21]);
    }

    #[test]
    fn test_runs_move_to_front_of_decode_order() {
        let mut builder = GraphBuilder::new(30);
        for &v in &[1_usize, 2, 10, 11, 12, 13, 25] {
            builder.add_edge(20, v, 1);
        }
        let compressed = compress(builder);

        let decoded: Vec<usize> = compressed.neighbors(20).map(|(_, v)| v).collect();
        assert_eq!(decoded, vec![10, 11, 12, 13, 1, 2, 25]);
    }

    #[test]
    fn test_edge_weights_follow_decode_order() {
        let mut builder = GraphBuilder::new(30);
        for &(v, w) in &[(1_usize, 3_i64), (2, 4), (10, 7), (11, 8), (12, 9), (13, 10)] {
            builder.add_edge(20, v, w);
        }
        let compressed = compress(builder);

        let decoded: Vec<(usize, i64)> = compressed
            .neighbors(20)
            .map(|(e, v)| (v, compressed.edge_weight(e)))
            .collect();
        assert_eq!(decoded, vec![(10, 7), (11, 8), (12, 9), (13, 10), (1, 3), (2, 4)]);
    }

    #[test]
    fn test_high_degree_node_uses_parts() {
        let degree = HIGH_DEGREE_THRESHOLD + 500;
        let mut builder = GraphBuilder::new(degree + 1);
        for v in 1..=degree {
            builder.add_edge(0, v, 1);
        }
        let compressed = compress(builder);

        assert_eq!(compressed.num_high_degree_nodes(), 1);
        assert_eq!(compressed.degree(0), degree);
        let decoded: Vec<usize> = compressed.neighbors(0).map(|(_, v)| v).collect();
        assert_eq!(decoded.len(), degree);
        // All neighbors are consecutive, so every part decodes as one run.
        assert_eq!(decoded, (1..=degree).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_adjacency() {
        let mut builder = GraphBuilder::new(3);
        builder.add_edge(0, 1, 1);
        let compressed = compress(builder);
        assert_eq!(compressed.degree(2), 0);
        assert_eq!(compressed.neighbors(2).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_compression_round_trip(
            adjacencies in proptest::collection::vec(
                proptest::collection::btree_set(0_usize..200, 0..40),
                1..30,
            )
        ) {
            // Interpret entry u as the neighbor set of node u and symmetrize.
            let n = 201.max(adjacencies.len());
            let mut builder = GraphBuilder::new(n);
            let mut expected = vec![std::collections::BTreeSet::new(); n];
            for (u, neighbors) in adjacencies.iter().enumerate() {
                for &v in neighbors {
                    if u != v && expected[u].insert(v) {
                        expected[v].insert(u);
                        builder.add_edge(u, v, (u + v) as i64 + 1);
                    }
                }
            }

            let compressed = compress(builder);
            for u in 0..n {
                let mut decoded: Vec<usize> =
                    compressed.neighbors(u).map(|(_, v)| v).collect();
                prop_assert_eq!(compressed.degree(u), decoded.len());
                decoded.sort_unstable();
                let expected: Vec<usize> = expected[u].iter().copied().collect();
                prop_assert_eq!(decoded, expected);

                for (e, v) in compressed.neighbors(u) {
                    prop_assert_eq!(compressed.edge_weight(e), (u + v) as i64 + 1);
                }
            }
        }
    }
}
