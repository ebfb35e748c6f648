use serde::{Serialize, Deserialize};

use super::node::Node;
use crate::{Regressor, Sample};

/// A fitted regression tree.
/// The leaves hold the raw Newton step; shrinkage is applied by the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTreeRegressor {
    root: Node,
}

impl From<Box<Node>> for RegressionTreeRegressor {
    #[inline]
    fn from(root: Box<Node>) -> Self {
        Self { root: *root }
    }
}

impl Regressor for RegressionTreeRegressor {
    fn predict(&self, sample: &Sample, row: usize) -> f64 {
        self.root.predict(sample, row)
    }
}

impl RegressionTreeRegressor {
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn n_leaves(&self) -> usize {
        self.root.n_leaves()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}
