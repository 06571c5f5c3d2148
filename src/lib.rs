//! Image Transformer - rotate, flip and crop images over HTTP
//!
//! Core library for the HTTP layer, the transform pipeline and the server
//! lifecycle.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod server;
pub mod transform;
