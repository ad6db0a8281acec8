//! External abort signal for DAG runs.

mod token;

pub use token::CancellationToken;
