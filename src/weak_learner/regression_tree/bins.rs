use std::fmt;
use std::ops::Range;

use crate::constants::PRINT_WIDTH_BINNING;
use crate::Feature;

/// A half-open interval `[start, end)` of feature values.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin(pub Range<f64>);

impl Bin {
    #[inline(always)]
    pub fn new(range: Range<f64>) -> Self {
        Self(range)
    }

    #[inline(always)]
    pub fn contains(&self, item: &f64) -> bool {
        self.0.contains(item)
    }

    pub fn start(&self) -> f64 { self.0.start }

    pub fn end(&self) -> f64 { self.0.end }
}

/// Gradient statistics accumulated over the rows falling in one bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinStat {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

/// Ordered, contiguous bins covering the real line.
/// The boundaries are midpoints between consecutive distinct values,
/// so every candidate threshold is a value no row takes.
#[derive(Debug, Clone)]
pub struct Bins(Vec<Bin>);

impl Bins {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bins themselves, from left to right.
    pub fn bins(&self) -> &[Bin] {
        &self.0
    }

    /// Cut `feature` into at most `max_bin` bins,
    /// each holding at least `min_data_in_bin` rows when possible.
    ///
    /// Consecutive distinct values are merged greedily.
    /// A bin is closed once it holds `max(min_data_in_bin, ⌈n / max_bin⌉)` rows
    /// (or `min_data_in_bin` rows when the feature has few distinct values).
    /// A short trailing bin is merged into its left neighbour.
    pub fn cut(feature: &Feature, max_bin: usize, min_data_in_bin: usize) -> Self {
        let counts = feature.value_counts();
        if counts.len() <= 1 {
            return Self(vec![Bin::new(f64::MIN..f64::MAX)]);
        }

        let max_bin = max_bin.max(1);
        let min_data_in_bin = min_data_in_bin.max(1);
        let n_sample = counts.iter().map(|(_, c)| c).sum::<usize>();
        let target = if counts.len() <= max_bin {
            min_data_in_bin
        } else {
            min_data_in_bin.max(n_sample.div_ceil(max_bin))
        };

        // `(first value, last value, count)` of each group.
        let mut groups: Vec<(f64, f64, usize)> = Vec::new();
        let mut current: Option<(f64, f64, usize)> = None;
        for (value, count) in counts {
            let (first, _, acc) = current.unwrap_or((value, value, 0));
            let acc = acc + count;
            if acc >= target {
                groups.push((first, value, acc));
                current = None;
            } else {
                current = Some((first, value, acc));
            }
        }
        if let Some((first, last, acc)) = current {
            match groups.last_mut() {
                Some(prev) if acc < min_data_in_bin => {
                    prev.1 = last;
                    prev.2 += acc;
                },
                _ => { groups.push((first, last, acc)); },
            }
        }

        let n_groups = groups.len();
        let mut bins = Vec::with_capacity(n_groups);
        let mut start = f64::MIN;
        for k in 0..n_groups {
            let end = if k + 1 == n_groups {
                f64::MAX
            } else {
                (groups[k].1 + groups[k + 1].0) / 2.0
            };
            bins.push(Bin::new(start..end));
            start = end;
        }
        Self(bins)
    }

    /// Index of the bin containing `value`.
    /// `NaN` falls in the right-most bin, as in [`Splitter::split`](super::node::Splitter::split).
    #[inline]
    pub fn position(&self, value: f64) -> usize {
        if value.is_nan() {
            return self.len() - 1;
        }
        self.0.partition_point(|bin| bin.end() <= value)
            .min(self.len() - 1)
    }

    /// Accumulate the gradient statistics of `indices` into the bins.
    pub fn pack(
        &self,
        indices: &[usize],
        feature: &Feature,
        gradient: &[f64],
        hessian: &[f64],
    ) -> Vec<BinStat>
    {
        let mut pack = vec![BinStat::default(); self.len()];
        for &i in indices {
            let stat = &mut pack[self.position(feature[i])];
            stat.grad += gradient[i];
            stat.hess += hessian[i];
            stat.count += 1;
        }
        pack
    }
}

impl fmt::Display for Bins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bins = &self.0;
        let n_bins = bins.len();
        let line = if n_bins > PRINT_WIDTH_BINNING {
            let head = bins[..2].iter()
                .map(|bin| format!("{bin}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{head}, ..., {}", bins[n_bins - 1])
        } else {
            bins.iter()
                .map(|bin| format!("{bin}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "{line}")
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = if self.start() == f64::MIN {
            String::from("-Inf")
        } else {
            format!("{:+.2}", self.start())
        };
        let end = if self.end() == f64::MAX {
            String::from("+Inf")
        } else {
            format!("{:+.2}", self.end())
        };
        write!(f, "[{start}, {end})")
    }
}
