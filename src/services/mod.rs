//! The object storage core and its building blocks.

pub mod access_policy;
pub mod content_store;
pub mod path_resolver;
pub mod storage_service;
