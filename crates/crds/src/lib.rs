//! IPAM CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the IPAM controller.

pub mod ipam;

pub use ipam::*;
