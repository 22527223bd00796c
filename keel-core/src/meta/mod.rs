mod immutable_prop;
mod immutable_type;
mod schema;

pub use immutable_prop::*;
pub use immutable_type::*;
pub use schema::*;
