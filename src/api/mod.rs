pub mod handler_utils;
pub mod response;
pub mod routes;
pub mod server;
pub mod tasks;
pub mod uploads;
