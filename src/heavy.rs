//! Heavy-gene classification.
//!
//! A gene is heavy for a node when its weight lies more than
//! [`HEAVY_GENE_STDEV_FACTOR`] sample standard deviations away from the
//! node's mean weight.

use serde::Serialize;

use crate::domain::Polarity;
use crate::error::LoaderError;
use crate::matrix::WeightMatrix;

pub const HEAVY_GENE_STDEV_FACTOR: f64 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureBucket {
    pub node: String,
    pub polarity: Polarity,
    pub genes: Vec<(String, f64)>,
}

impl SignatureBucket {
    pub fn signature_name(&self) -> String {
        self.polarity.signature_name(&self.node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStats {
    pub node: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl NodeStats {
    pub fn upper(&self) -> f64 {
        self.mean + HEAVY_GENE_STDEV_FACTOR * self.std_dev
    }

    pub fn lower(&self) -> f64 {
        self.mean - HEAVY_GENE_STDEV_FACTOR * self.std_dev
    }
}

/// Positive and negative buckets for every node, in header order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeavyGeneSet {
    pub stats: Vec<NodeStats>,
    pub buckets: Vec<SignatureBucket>,
}

impl HeavyGeneSet {
    pub fn bucket(&self, signature_name: &str) -> Option<&SignatureBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.signature_name() == signature_name)
    }

    pub fn heavy_gene_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.genes.len()).sum()
    }
}

pub fn classify(matrix: &WeightMatrix) -> Result<HeavyGeneSet, LoaderError> {
    let mut stats = Vec::with_capacity(matrix.nodes().len());
    let mut buckets = Vec::with_capacity(matrix.nodes().len() * 2);

    for (index, node) in matrix.nodes().iter().enumerate() {
        let weights: Vec<f64> = matrix.column(index).map(|(_, weight)| weight).collect();
        let node_stats = node_stats(node, &weights)?;

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for (gene, weight) in matrix.column(index) {
            if weight > node_stats.upper() {
                positive.push((gene.to_string(), weight));
            } else if weight < node_stats.lower() {
                negative.push((gene.to_string(), weight));
            }
        }

        buckets.push(SignatureBucket {
            node: node.clone(),
            polarity: Polarity::Pos,
            genes: positive,
        });
        buckets.push(SignatureBucket {
            node: node.clone(),
            polarity: Polarity::Neg,
            genes: negative,
        });
        stats.push(node_stats);
    }

    Ok(HeavyGeneSet { stats, buckets })
}

fn node_stats(node: &str, weights: &[f64]) -> Result<NodeStats, LoaderError> {
    let count = weights.len();
    if count < 2 {
        return Err(LoaderError::InsufficientSamples {
            node: node.to_string(),
            count,
        });
    }
    let mean = weights.iter().sum::<f64>() / count as f64;
    let variance = weights
        .iter()
        .map(|weight| (weight - mean).powi(2))
        .sum::<f64>()
        / (count - 1) as f64;

    Ok(NodeStats {
        node: node.to_string(),
        count,
        mean,
        std_dev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    fn matrix_from_column(weights: &[f64]) -> WeightMatrix {
        let mut input = String::from("gene\tNode1\n");
        for (idx, weight) in weights.iter().enumerate() {
            input.push_str(&format!("PA{idx:04}\t{weight}\n"));
        }
        WeightMatrix::parse(Cursor::new(input)).unwrap()
    }

    #[test]
    fn outlier_below_threshold_is_not_heavy() {
        let heavy = classify(&matrix_from_column(&[1.0, 2.0, 100.0])).unwrap();
        assert!((heavy.stats[0].mean - 34.333).abs() < 1e-3);
        assert!((heavy.stats[0].std_dev - 56.871).abs() < 1e-3);
        assert_eq!(heavy.heavy_gene_count(), 0);
    }

    #[test]
    fn single_spike_is_positive() {
        let mut weights = vec![0.0; 9];
        weights.push(100.0);
        let heavy = classify(&matrix_from_column(&weights)).unwrap();

        assert!((heavy.stats[0].mean - 10.0).abs() < 1e-9);
        assert!((heavy.stats[0].std_dev - 31.623).abs() < 1e-3);
        let pos = heavy.bucket("Node1pos").unwrap();
        assert_eq!(pos.genes, vec![("PA0009".to_string(), 100.0)]);
        assert!(heavy.bucket("Node1neg").unwrap().genes.is_empty());
    }

    #[test]
    fn single_dip_is_negative() {
        let mut weights = vec![5.0; 11];
        weights.push(-500.0);
        let heavy = classify(&matrix_from_column(&weights)).unwrap();
        let neg = heavy.bucket("Node1neg").unwrap();
        assert_eq!(neg.genes, vec![("PA0011".to_string(), -500.0)]);
    }

    #[test]
    fn both_buckets_exist_for_every_node() {
        let input = "gene\tA\tB\nPA0001\t1\t1\nPA0002\t1\t1\n";
        let heavy = classify(&WeightMatrix::parse(Cursor::new(input)).unwrap()).unwrap();
        let names: Vec<String> = heavy.buckets.iter().map(|b| b.signature_name()).collect();
        assert_eq!(names, vec!["Apos", "Aneg", "Bpos", "Bneg"]);
        assert_eq!(heavy.heavy_gene_count(), 0);
    }

    #[test]
    fn one_gene_is_not_enough() {
        let err = classify(&matrix_from_column(&[4.2])).unwrap_err();
        assert_matches!(err, LoaderError::InsufficientSamples { count: 1, .. });
    }

    proptest! {
        #[test]
        fn buckets_partition_each_node(weights in prop::collection::vec(-1.0e3f64..1.0e3, 2..60)) {
            let matrix = matrix_from_column(&weights);
            let heavy = classify(&matrix).unwrap();

            let pos: HashSet<_> = heavy.bucket("Node1pos").unwrap().genes.iter().map(|(g, _)| g.clone()).collect();
            let neg: HashSet<_> = heavy.bucket("Node1neg").unwrap().genes.iter().map(|(g, _)| g.clone()).collect();
            prop_assert!(pos.is_disjoint(&neg));

            let stats = &heavy.stats[0];
            let neither: HashSet<_> = matrix
                .column(0)
                .filter(|(_, w)| *w <= stats.upper() && *w >= stats.lower())
                .map(|(g, _)| g.to_string())
                .collect();
            prop_assert!(neither.is_disjoint(&pos));
            prop_assert!(neither.is_disjoint(&neg));
            prop_assert_eq!(pos.len() + neg.len() + neither.len(), matrix.genes().len());

            prop_assert_eq!(classify(&matrix).unwrap(), heavy);
        }
    }
}
