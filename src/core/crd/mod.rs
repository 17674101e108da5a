pub mod mpa_crd;
pub mod mpa_checkpoint_crd;
