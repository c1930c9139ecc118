// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod abort;
pub mod prune;
pub mod run;
pub mod stress;

pub use utils::*;
