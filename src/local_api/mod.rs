pub mod conflicts;
pub mod models;
pub mod routes;
pub mod services;

pub use routes::LocalApi;
