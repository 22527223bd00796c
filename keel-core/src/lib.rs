mod as_value;
mod association;
mod binlog;
mod cache;
mod client;
mod draft;
mod driver;
mod entity;
mod error;
mod executor;
mod expression;
mod fetcher;
mod interceptor;
mod loader;
mod meta;
mod query;
mod row;
mod save;
mod table;
mod trigger;
mod util;
mod value;
pub mod writer;

pub use ::anyhow::Context;
pub use as_value::*;
pub use association::*;
pub use binlog::*;
pub use cache::*;
pub use client::*;
pub use draft::{Draft, DraftDiff};
pub use driver::*;
pub use entity::*;
pub use error::*;
pub use executor::*;
pub use expression::*;
pub use fetcher::*;
pub use interceptor::*;
pub use loader::*;
pub use meta::*;
pub use query::*;
pub use row::*;
pub use save::{SaveMode, SaveResult};
pub use table::*;
pub use trigger::{
    AssociationEvent, AssociationEventKind, AssociationListener, EntityEvent, EntityEventKind,
    EntityListener, Event, ListenerId, Triggers,
};
pub use util::*;
pub use value::*;
pub use writer::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
