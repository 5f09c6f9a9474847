/*!
Shared data model of the node bootstrap artifact builder.

The [`nbc::NodeBootstrappingConfiguration`] record is the single input of the builder; the image
records in [`image`] and the status parser in [`cse_status`] are the pieces callers exchange with
it on either side.
*/
pub mod cloud;
pub mod constants;
pub mod cse_status;
pub mod distro;
pub mod image;
pub mod kubelet;
pub mod nbc;
pub mod telemetry;
pub mod version;

pub use cloud::AzureEnvironmentSpecConfig;
pub use distro::{Distro, DistroFamily, DistroInfo};
pub use image::{AzureOsImageConfig, EnvironmentInfo, SigConfig, SigImageConfig};
pub use nbc::NodeBootstrappingConfiguration;
