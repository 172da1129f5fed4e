#[macro_use] // extern crate with #[macro_use] because diesel does not fully support Rust 2018 yet.
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod database;
pub mod gateway;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod password;
