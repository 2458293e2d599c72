//! Layer implementations, one file per layer.

pub mod attention;
pub mod block;
pub mod embedding;
pub mod feed_forward;
pub mod layer_norm;
pub mod linear;
