pub mod client;
pub mod crd;
pub mod model;
pub mod state;
