/*! The parallel histogram task.

A task splits the decoded payload into sample aligned slices, counts every slice on
the rayon thread pool into a leased buffer and folds the partial results pairwise
until a single histogram is left.
*/

mod context;
mod merge;
mod partition;
mod worker;

pub use context::{Histogram, HistogramTask, RunReport};
pub use merge::{merge_pair, reduce_sequential, MergeQueue};
pub use partition::{partition, Slice};
pub use worker::count_slice;
