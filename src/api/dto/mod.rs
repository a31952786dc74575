//! Data Transfer Objects for REST request/response serialization.

pub mod fetch_dto;
pub mod registry_dto;

pub use fetch_dto::*;
pub use registry_dto::*;
