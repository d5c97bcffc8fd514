//! Pingora wiring for the Skafos data plane.
//!
//! `MeshProxy` is the `ProxyHttp` implementation that drives request
//! forwarding; the actual routing decision lives in [`crate::engine`].

mod mesh_proxy;

pub use mesh_proxy::MeshProxy;
