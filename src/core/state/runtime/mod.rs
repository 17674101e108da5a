pub mod mpa;
