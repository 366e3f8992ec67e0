mod mongodb_cluster;

pub use mongodb_cluster::*;
