pub mod checkpoint_service;
