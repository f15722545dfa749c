pub mod config;
pub mod db;
pub mod models;
pub mod repos;
pub mod routes;
pub mod services;
