//! Prints the CustomResourceDefinition manifests for every CRD in this crate.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases.yaml`

use crds::{Domain, HTTPSEdge, Tunnel};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [Domain::crd(), HTTPSEdge::crd(), Tunnel::crd()];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
