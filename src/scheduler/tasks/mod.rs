pub mod checkpoint;
pub mod collectors;
pub mod recommend;
