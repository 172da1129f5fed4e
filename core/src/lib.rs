// Extern crate with #[macro_use] because the diesel table DSL macros are not importable paths.
#[macro_use]
extern crate diesel;

pub mod model;
pub mod schema;
