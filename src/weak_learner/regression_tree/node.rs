//! Nodes of a fitted regression tree.
use serde::{Serialize, Deserialize};
use std::fmt;

use crate::{Regressor, Sample};

/// The side a row is routed to by a [`Splitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftRight {
    Left,
    Right,
}

/// A split `feature < threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Splitter {
    pub feature: String,
    pub threshold: f64,
}

impl Splitter {
    #[inline]
    pub fn new(name: &str, threshold: f64) -> Self {
        Self { feature: name.to_string(), threshold, }
    }

    /// Rows with `value < threshold` go left, everything else
    /// (including `NaN`) goes right.
    #[inline]
    pub fn split(&self, sample: &Sample, row: usize) -> LeftRight {
        let value = sample[&self.feature][row];
        if value < self.threshold { LeftRight::Left } else { LeftRight::Right }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Branch {
        splitter:   Splitter,
        left:       Box<Node>,
        right:      Box<Node>,
        confidence: f64,
    },
    Leaf {
        confidence: f64,
    },
}

impl Node {
    pub fn branch(
        splitter:   Splitter,
        left:       Box<Node>,
        right:      Box<Node>,
        confidence: f64,
    ) -> Self
    {
        Self::Branch { splitter, left, right, confidence, }
    }

    pub fn leaf(confidence: f64) -> Self {
        Self::Leaf { confidence, }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            Self::Branch { left, right, .. } => left.n_leaves() + right.n_leaves(),
            Self::Leaf { .. } => 1,
        }
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        match self {
            Self::Branch { left, right, .. } => {
                1 + left.depth().max(right.depth())
            },
            Self::Leaf { .. } => 0,
        }
    }

    /// Names of the features used by the splits, in depth-first order.
    pub fn split_features(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_split_features(&mut names);
        names
    }

    fn collect_split_features<'a>(&'a self, names: &mut Vec<&'a str>) {
        if let Self::Branch { splitter, left, right, .. } = self {
            names.push(splitter.feature.as_str());
            left.collect_split_features(names);
            right.collect_split_features(names);
        }
    }
}

impl Regressor for Node {
    fn predict(&self, sample: &Sample, row: usize) -> f64 {
        match self {
            Self::Branch { splitter, left, right, .. } => {
                match splitter.split(sample, row) {
                    LeftRight::Left  => left.predict(sample, row),
                    LeftRight::Right => right.predict(sample, row),
                }
            },
            Self::Leaf { confidence } => *confidence,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch { splitter, left, right, confidence } => {
                f.debug_struct("Branch")
                    .field("splitter", &splitter)
                    .field("confidence", &confidence)
                    .field("left", &left)
                    .field("right", &right)
                    .finish()
            },
            Self::Leaf { confidence } => {
                f.debug_struct("Leaf")
                    .field("confidence", &confidence)
                    .finish()
            },
        }
    }
}
