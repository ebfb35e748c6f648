pub mod bins;
pub mod builder;
pub mod node;
pub mod regressor;
pub mod rtree;

pub use bins::{Bin, Bins};
pub use builder::RegressionTreeBuilder;
pub use node::{Node, Splitter, LeftRight};
pub use regressor::RegressionTreeRegressor;
pub use rtree::RegressionTree;
