pub mod auth_service;
pub mod buzzer;
pub mod displays;
pub mod timer;
