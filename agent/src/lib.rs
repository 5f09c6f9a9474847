/*!
Builds the artifacts an AKS node is bootstrapped with.

Given a [`NodeBootstrappingConfiguration`](datamodel::NodeBootstrappingConfiguration), an
[`AgentBaker`] produces the node's custom data (cloud-init, Ignition or a PowerShell ARM
expression), the one-line custom script extension command, and the marketplace or gallery image
the node boots from.

```no_run
use agentbaker::{AgentBaker, Context, Toggles};

# fn run(nbc: datamodel::NodeBootstrappingConfiguration) -> agentbaker::error::Result<()> {
let baker = AgentBaker::new(Toggles::default());
let bootstrapping = baker.get_node_bootstrapping(&Context::background(), &nbc)?;
println!("{}", bootstrapping.cse);
# Ok(())
# }
```
*/
pub mod assets;
pub mod baker;
pub mod components;
pub mod context;
pub mod cri;
pub mod encoding;
pub mod error;
pub mod extensions;
pub mod funcmap;
pub mod image;
pub mod kubelet;
pub mod linux_os;
pub mod packager;
pub mod params;
pub mod proxy;
pub mod sku;
pub mod snapshot;
pub mod template;
pub mod toggles;
pub mod variables;

pub use baker::{AgentBaker, NodeBootstrapping};
pub use context::Context;
pub use error::Error;
pub use toggles::{Entity, Toggles};
