//! Small helpers shared by the ingestion pipeline.
//!
//! Current helpers:
//! - Mapping tick ranges onto day or sub-day file slots.
//! - Parsing and rendering the path templates that name those files.
pub mod path_template;
pub mod time_slot;
