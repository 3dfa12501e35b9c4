pub mod agent;
pub mod containment;
pub mod errors;
pub mod models;
pub mod providers;
pub mod safety;
pub mod store;
pub mod systems;
pub mod workspace;
