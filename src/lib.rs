//! PPMC — structural compressor for Parallel Program Models.
//!
//! A PPM is a directed acyclic task graph describing the computation and
//! communication structure of a parallel program. This crate parses the
//! textual task-list format into a tree-shaped intermediate representation,
//! mines it for structural regularities (symmetric forks, asymmetric
//! subtree reuse, recurrences along a stem), clusters structurally
//! equivalent task segments, quantizes their weights into per-cluster
//! bucket dictionaries, deduplicates identical segments and serializes the
//! result into a compact binary file. A baseline serializer for the
//! uncompressed model measures the compression ratio.
//!
//! Typical pipeline:
//!
//! ```no_run
//! use ppmc::classifier::DictionaryStore;
//! use ppmc::cluster::{compress_segments, deduplicate_segments};
//! use ppmc::model::{build_model, BuildOptions};
//! use ppmc::parser::parse_model;
//! use ppmc::segment::{BucketedSegmentStore, RawSegmentStore};
//! use ppmc::{miner, wire};
//!
//! # fn main() -> ppmc::Result<()> {
//! let text = std::io::BufReader::new(std::fs::File::open("model.txt")?);
//! let table = parse_model(text)?;
//!
//! let mut raw = RawSegmentStore::new(1.25, 1.25);
//! let mut model = build_model(&table, BuildOptions::default(), &mut raw)?;
//!
//! miner::mine_symmetric(&mut model);
//! miner::mine_asymmetric(&mut model);
//! miner::mine_recurrence(&mut model);
//!
//! let mut buck = BucketedSegmentStore::new();
//! let mut dicts = DictionaryStore::new();
//! compress_segments(&mut model, &raw, &mut buck, &mut dicts, 0.04)?;
//! deduplicate_segments(&mut model, &raw, &mut buck, 0.04);
//!
//! let mut out = std::fs::File::create("model.dat")?;
//! wire::export_bucketed(&mut model, &buck, &dicts, &mut out)?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod cluster;
pub mod error;
pub mod miner;
pub mod model;
pub mod parser;
pub mod segment;
pub mod stats;
pub mod wire;

pub use error::{PpmError, Result};
pub use model::{Model, ModelSummary};
pub use segment::{BucketedSegmentStore, RawSegmentStore};
