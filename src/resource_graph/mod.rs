// substrate/virtual network data model with residual capacity tracking
// mutated exclusively by the embedding orchestrator during apply/unembed

pub mod elements;
pub mod graph;
pub mod paths;

pub use elements::{
    Bandwidth,Dimension,GraphError,Link,LinkId,Network,NetworkId,Node,NodeCapacity,NodeId,Path,
    PathId,SubstrateTarget,VirtualElement,DIMENSIONS,
};
pub use graph::ResourceGraph;
