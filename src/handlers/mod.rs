//! HTTP request handlers, grouped by resource.

pub mod bucket;
pub mod object;
pub mod presign;
