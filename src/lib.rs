// virtual network embedding: maps virtual network requests with node and
// link resource demands onto a finite-capacity substrate network, driven
// by an incremental integer program over candidate matches

pub mod embedding;
pub mod resource_graph;
