pub mod booking;
pub mod conversation;
pub mod interaction;
pub mod service;
pub mod user;
