use keel::{Draft, Entity, IdGeneration, Schema, TypeBuilder, Value};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const MANNING: Uuid = Uuid::from_u128(0x2fa8_5b2c_7e91_4f0d_9a3e_5c1b_0d2e_4a61);
pub const OREILLY: Uuid = Uuid::from_u128(0xd38c_10da_6be8_4d37_9a52_1b3f_8e27_c4f0);

/// Stores, books and authors, with a mapped superclass carrying the audit columns.
///
/// - `BookStore`: uuid ids, generated
/// - `Book`: identity ids, `store` is a nullable reference, `authors` is many-to-many
/// - `Author`: ids assigned by the caller, `books` is the inverse of `Book.authors`
/// - `Chapter`: non null reference to its book
pub fn bookstore_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .add(
                TypeBuilder::mapped_superclass("Tracked")
                    .scalar("createdTime", Value::Timestamp(None))
                    .nullable()
                    .scalar("modifiedTime", Value::Timestamp(None))
                    .nullable(),
            )
            .add(
                TypeBuilder::entity("BookStore")
                    .extends("Tracked")
                    .id("id", Value::Uuid(None), IdGeneration::Uuid)
                    .key("name", Value::Varchar(None))
                    .scalar("website", Value::Varchar(None))
                    .nullable()
                    .one_to_many("books", "Book", "store"),
            )
            .add(
                TypeBuilder::entity("Book")
                    .id("id", Value::Int64(None), IdGeneration::Identity)
                    .key("name", Value::Varchar(None))
                    .key("edition", Value::Int32(None))
                    .scalar("price", Value::Decimal(None))
                    .reference("store", "BookStore")
                    .nullable()
                    .many_to_many("authors", "Author"),
            )
            .add(
                TypeBuilder::entity("Author")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .scalar("firstName", Value::Varchar(None))
                    .scalar("lastName", Value::Varchar(None))
                    .many_to_many_inverse("books", "Book", "authors"),
            )
            .add(
                TypeBuilder::entity("Chapter")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .scalar("title", Value::Varchar(None))
                    .reference("book", "Book"),
            )
            .build()
            .expect("The bookstore schema must be valid"),
    )
}

/// Entity of `ty` with the given props loaded.
pub fn entity(schema: &Schema, ty: &str, props: &[(&str, Value)]) -> Entity {
    let mut draft = Draft::new(schema, ty).expect("Unknown type");
    for (name, value) in props {
        draft
            .set(*name, value.clone())
            .unwrap_or_else(|e| panic!("Cannot set `{ty}.{name}`: {e:#}"));
    }
    draft.resolve().0
}

pub fn book(schema: &Schema, id: i64, name: &str, edition: i32, price: Decimal) -> Entity {
    entity(
        schema,
        "Book",
        &[
            ("id", id.into()),
            ("name", name.into()),
            ("edition", edition.into()),
            ("price", price.into()),
        ],
    )
}

pub fn author(schema: &Schema, id: i64, first_name: &str, last_name: &str) -> Entity {
    entity(
        schema,
        "Author",
        &[
            ("id", id.into()),
            ("firstName", first_name.into()),
            ("lastName", last_name.into()),
        ],
    )
}
