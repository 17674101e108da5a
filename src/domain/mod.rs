pub mod checkpoint;
pub mod recommendation;
pub mod status;
