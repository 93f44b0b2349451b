//! EAN-13 feature module
//!
//! HTTP access to the internal barcode codec.

pub mod routes;

pub use routes::ean_routes;
