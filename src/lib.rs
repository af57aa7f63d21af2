//! # actor-output - Run-aware output storage for Monte-Carlo actors
//!
//! Actors score quantities (deposited energy, fluence, counts) into named
//! outputs. Each output keeps the data of individual runs, merges them into
//! a running aggregate, and writes both to disk under deterministic names.
//!
//! ## Core Concepts
//!
//! - **DataItem**: A fixed-arity tuple of images that can be summed and divided
//! - **DataItemContainer**: One data item plus metadata and a per-item write configuration
//! - **ActorOutput**: Per-run and merged containers of one named output, with retention policy
//! - **Selector**: Parsed addressing of `merged`, `all_runs`, `all` or a run index
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use actor_output::{ActorOutput, ActorOutputConfig, ContainerRegistry, Image, OutputDirectory};
//!
//! let config = ActorOutputConfig::new("edep", "dose_actor").output_filename("dose.mhd");
//! let mut output = ActorOutput::image(
//!     config,
//!     &ContainerRegistry::with_defaults(),
//!     Arc::new(OutputDirectory::new("output")),
//! )?;
//!
//! output.initialize()?;
//! output.store_data(0, Image::from_vec(vec![1.0; 8]))?;
//! output.end_of_run(0)?;
//! output.end_of_simulation()?; // writes output/dose.mhd
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod image;
pub mod item;
pub mod path;
pub mod selector;

// Containers, persistence and outputs
pub mod container;
pub mod output;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use container::{
    ContainerKind, ContainerRegistry, DataItemContainer, ItemData, ItemWriteConfig, MergeRule, WriteConfig,
};
pub use error::{ConfigurationError, DataItemError, OutputError, OutputResult, StateError};
pub use image::{Image, ImageProperties};
pub use item::{DataItem, ItemId, ItemShape};
pub use output::{
    ActorOutput, ActorOutputConfig, ActorOutputRegistry, OutputKey, OutputVariant, RawData, AUTO_FILENAME,
};
pub use path::{insert_suffix_before_extension, OutputDirectory, OutputPathResolver};
pub use selector::{run_suffix, DataIdentifier, IntoSelector, RunIndex, Selector};
pub use storage::{FileHeader, StoredImage};
