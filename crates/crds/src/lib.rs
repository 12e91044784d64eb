//! Ingress Controller CRD Definitions
//!
//! Kubernetes Custom Resource Definitions derived from Ingress objects:
//! - `Domain`: a public hostname claimed for an Ingress host
//! - `HTTPSEdge`: routing rules for traffic arriving at a domain
//! - `Tunnel`: a forwarding target for one backend service port

pub mod domain;
pub mod https_edge;
pub mod labels;
pub mod tunnel;

pub use domain::*;
pub use https_edge::*;
pub use labels::*;
pub use tunnel::*;
