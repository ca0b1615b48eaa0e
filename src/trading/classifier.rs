// src/trading/classifier.rs
use crate::analysis::indicators::{IndicatorSnapshot, FEATURE_NAMES};
use crate::analysis::labeling::LabeledRow;
use crate::domain::errors::{AnalysisError, AnalysisResult};
use crate::domain::models::StrategyLabel;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const N_CLASSES: usize = StrategyLabel::ALL.len();
const N_FEATURES: usize = FEATURE_NAMES.len();

/// Maps an indicator snapshot to a market regime
pub trait LabelClassifier: Send + Sync {
    /// Fit on labeled rows, replacing any previous model
    fn train(&mut self, rows: &[LabeledRow]) -> AnalysisResult<()>;

    /// Predict the regime for one snapshot
    fn predict(&self, snapshot: &IndicatorSnapshot) -> AnalysisResult<StrategyLabel>;

    fn is_fitted(&self) -> bool;
}

/// Decision tree configuration
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf node
    pub min_samples_leaf: usize,
    /// Features drawn per split; all of them when None
    pub max_features: Option<usize>,
    /// Seed for the feature draws
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

/// Majority class; ties go to the lower class index
fn majority(counts: &[usize; N_CLASSES]) -> StrategyLabel {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    StrategyLabel::from_index(best)
}

/// Feature rows for `rows`, rejecting empty or non-finite input
fn feature_matrix(rows: &[LabeledRow]) -> AnalysisResult<Vec<[f64; N_FEATURES]>> {
    if rows.is_empty() {
        return Err(AnalysisError::Training("No labeled rows to train on".to_string()));
    }

    let features: Vec<[f64; N_FEATURES]> = rows.iter().map(|r| r.snapshot.features()).collect();
    if features.iter().flatten().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Training(
            "Training features contain non-finite values".to_string(),
        ));
    }
    Ok(features)
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        label: StrategyLabel,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// CART classification tree with Gini impurity
#[derive(Debug, Clone, Default)]
pub struct DecisionTreeClassifier {
    config: TreeConfig,
    root: Option<Node>,
}

impl DecisionTreeClassifier {
    pub fn new(config: TreeConfig) -> Self {
        Self { config, root: None }
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }

    fn class_counts(rows: &[LabeledRow], indices: &[usize]) -> [usize; N_CLASSES] {
        let mut counts = [0; N_CLASSES];
        for &i in indices {
            counts[rows[i].label.index()] += 1;
        }
        counts
    }

    fn gini(counts: &[usize; N_CLASSES]) -> f64 {
        let total: usize = counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        1.0 - counts
            .iter()
            .map(|&c| (c as f64 / total).powi(2))
            .sum::<f64>()
    }

    /// Fit on the rows selected by `indices` (repeats allowed)
    fn fit_indices(&mut self, rows: &[LabeledRow], features: &[[f64; N_FEATURES]], indices: &[usize]) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.root = Some(self.build(rows, features, indices, 0, &mut rng));
    }

    fn build(
        &self,
        rows: &[LabeledRow],
        features: &[[f64; N_FEATURES]],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let counts = Self::class_counts(rows, indices);
        let impurity = Self::gini(&counts);

        // Check stopping conditions
        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity < 1e-10
        {
            return Node::Leaf {
                label: majority(&counts),
            };
        }

        match self.find_best_split(rows, features, indices, impurity, rng) {
            Some(split) => Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(self.build(rows, features, &split.left, depth + 1, rng)),
                right: Box::new(self.build(rows, features, &split.right, depth + 1, rng)),
            },
            None => Node::Leaf {
                label: majority(&counts),
            },
        }
    }

    fn find_best_split(
        &self,
        rows: &[LabeledRow],
        features: &[[f64; N_FEATURES]],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let mut candidates: Vec<usize> = (0..N_FEATURES).collect();
        let max_features = match self.config.max_features {
            Some(k) => {
                candidates.shuffle(rng);
                k.clamp(1, N_FEATURES)
            }
            None => N_FEATURES,
        };

        let mut best_gain = 0.0;
        let mut best: Option<BestSplit> = None;

        for (tried, &feature) in candidates.iter().enumerate() {
            // Past the draw, keep looking only until some split is found
            if tried >= max_features && best.is_some() {
                break;
            }

            let mut values: Vec<f64> = indices.iter().map(|&i| features[i][feature]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();

            // Try midpoints as thresholds
            for window in values.windows(2) {
                let threshold = (window[0] + window[1]) / 2.0;

                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| features[i][feature] <= threshold);

                if left.len() < self.config.min_samples_leaf
                    || right.len() < self.config.min_samples_leaf
                {
                    continue;
                }

                let n_left = left.len() as f64;
                let n_right = right.len() as f64;
                let weighted = (n_left * Self::gini(&Self::class_counts(rows, &left))
                    + n_right * Self::gini(&Self::class_counts(rows, &right)))
                    / (n_left + n_right);
                let gain = parent_impurity - weighted;

                if gain > best_gain {
                    best_gain = gain;
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        left,
                        right,
                    });
                }
            }
        }

        best
    }
}

impl LabelClassifier for DecisionTreeClassifier {
    fn train(&mut self, rows: &[LabeledRow]) -> AnalysisResult<()> {
        let features = feature_matrix(rows)?;
        let indices: Vec<usize> = (0..rows.len()).collect();
        self.fit_indices(rows, &features, &indices);

        log::debug!(
            "Trained decision tree on {} rows (depth {})",
            rows.len(),
            self.depth()
        );
        Ok(())
    }

    fn predict(&self, snapshot: &IndicatorSnapshot) -> AnalysisResult<StrategyLabel> {
        let mut node = self
            .root
            .as_ref()
            .ok_or_else(|| AnalysisError::Training("Classifier is not fitted".to_string()))?;
        let features = snapshot.features();

        loop {
            match node {
                Node::Leaf { label } => return Ok(*label),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

/// Random forest configuration
#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split (ceil of sqrt of the feature count if None)
    pub max_features: Option<usize>,
    /// Fit each tree on a bootstrap sample
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Bagged decision trees voting on the regime
#[derive(Debug, Clone, Default)]
pub struct RandomForestClassifier {
    config: ForestConfig,
    trees: Vec<DecisionTreeClassifier>,
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Deepest tree in the forest
    pub fn depth(&self) -> usize {
        self.trees.iter().map(|t| t.depth()).max().unwrap_or(0)
    }

    fn sample_indices(&self, n: usize, seed: u64) -> Vec<usize> {
        if !self.config.bootstrap {
            return (0..n).collect();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(0..n)).collect()
    }
}

impl LabelClassifier for RandomForestClassifier {
    fn train(&mut self, rows: &[LabeledRow]) -> AnalysisResult<()> {
        if self.config.n_trees == 0 {
            return Err(AnalysisError::Training("Forest needs at least one tree".to_string()));
        }
        let features = feature_matrix(rows)?;
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (N_FEATURES as f64).sqrt().ceil() as usize);

        let trees = (0..self.config.n_trees)
            .map(|i| {
                let seed = self.config.seed.wrapping_add(i as u64);
                let mut tree = DecisionTreeClassifier::new(TreeConfig {
                    max_depth: self.config.max_depth,
                    min_samples_split: self.config.min_samples_split,
                    min_samples_leaf: self.config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed,
                });
                tree.fit_indices(rows, &features, &self.sample_indices(rows.len(), seed));
                tree
            })
            .collect();
        self.trees = trees;

        log::debug!(
            "Trained random forest of {} trees on {} rows (max depth {})",
            self.trees.len(),
            rows.len(),
            self.depth()
        );
        Ok(())
    }

    fn predict(&self, snapshot: &IndicatorSnapshot) -> AnalysisResult<StrategyLabel> {
        if self.trees.is_empty() {
            return Err(AnalysisError::Training("Classifier is not fitted".to_string()));
        }

        let mut votes = [0; N_CLASSES];
        for tree in &self.trees {
            votes[tree.predict(snapshot)?.index()] += 1;
        }
        Ok(majority(&votes))
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
