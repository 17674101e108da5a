pub mod mpa_status_service;
