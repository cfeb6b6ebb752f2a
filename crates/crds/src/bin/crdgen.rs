//! Prints the CRD manifests served by the IPAM controller.

use crds::IPAM;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    println!("---");
    print!("{}", serde_yaml::to_string(&IPAM::crd())?);
    Ok(())
}
