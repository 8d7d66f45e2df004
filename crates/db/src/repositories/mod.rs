//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod arrangement_repo;

pub use arrangement_repo::ArrangementRepo;
