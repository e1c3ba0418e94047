// Library for tests to access modules

pub mod config;
pub mod models;
pub mod ping_repo;
pub mod routes;
pub mod version;
