pub mod analytics;
pub mod auth;
pub mod backup;
pub mod classes;
pub mod content;
pub mod core;
pub mod messaging;
pub mod submissions;
