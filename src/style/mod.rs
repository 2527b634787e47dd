//! Style synchronization.
//!
//! # Modules
//!
//! - [`document`]: Style document model (layers, sources, metadata)
//! - [`visibility`]: Flags, units and visibility predicates
//! - [`controller`]: Layer groups and their application to a backend
//! - [`attribution`]: Attribution deduplication and host labels

pub mod attribution;
pub mod controller;
pub mod document;
pub mod visibility;

pub use attribution::AttributionAggregator;
pub use controller::{refresh_source, LayerGroups, StyleController};
pub use document::{SourceSpec, StyleDocument, StyleLayer};
pub use visibility::{Flags, Units, VisibilityPredicate};
