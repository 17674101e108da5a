pub mod mappers;
pub mod task;

pub use task::run;
