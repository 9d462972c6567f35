//! Archaeological survey data loading and merging tools.
//!
//! Two batch pipelines composed through files on disk: a mapped loader
//! that inserts delimited rows into PostgreSQL with per-row savepoint
//! isolation, and a site/photo merger that widens a site table with
//! pipe-joined photo columns grouped by type.

pub mod cli;
pub mod db;
pub mod loader;
pub mod merge;
pub mod tabular;
