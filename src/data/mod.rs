//! Data layer: core types, label parsing, loading, and filtering.
//!
//! ```text
//!  .csv / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file + sample labels → Dataset
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  Dataset  │  Vec<Record>, device/section universe
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  one section + feature → complete-subject subset
//!   └──────────┘
//! ```

pub mod filter;
pub mod labels;
pub mod loader;
pub mod model;
