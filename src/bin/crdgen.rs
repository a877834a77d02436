//! Prints the Istio CustomResourceDefinition as YAML.

use istio_mesh_operator::Istio;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Istio::crd())?);
    Ok(())
}
