#[cfg(test)]
mod tests {
    use keel::{
        Draft, Entity, FnInterceptor, OrmError, SaveMode, SqlClient, Value, error_kind,
    };
    use keel_tests::{
        RecordingExecutor, Response, book, bookstore_schema, entity, init_logs, silent_logs,
    };
    use rust_decimal::Decimal;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use time::macros::datetime;

    #[tokio::test]
    async fn insert_reads_back_identity() {
        init_logs();
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond("insert into BOOK", Response::inserted(42));
        let draft = entity(
            &schema,
            "Book",
            &[
                ("name", "GraphQL in Action".into()),
                ("edition", 1.into()),
                ("price", Decimal::new(8000, 2).into()),
            ],
        );
        let result = client
            .save(&mut executor, draft, SaveMode::Upsert)
            .await
            .unwrap();
        assert!(result.is_new);
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.entity.id(&schema).unwrap(), Value::Int64(Some(42)));
        assert_eq!(
            executor.sql(),
            [
                "select tb_1_.ID\nfrom BOOK as tb_1_\nwhere tb_1_.NAME = ? and tb_1_.EDITION = ?",
                "insert into BOOK(NAME, EDITION, PRICE) values(?, ?, ?)",
            ]
        );
        assert_eq!(
            executor.statements()[1].variables,
            [
                Value::Varchar(Some("GraphQL in Action".into())),
                Value::Int32(Some(1)),
                Value::Decimal(Some(Decimal::new(8000, 2))),
            ]
        );
    }

    #[tokio::test]
    async fn insert_without_reported_identity() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        let draft = entity(
            &schema,
            "Book",
            &[("name", "Learning GraphQL".into()), ("edition", 1.into())],
        );
        silent_logs! {
            let error = client
                .save(&mut executor, draft, SaveMode::Insert)
                .await
                .unwrap_err();
            assert!(matches!(error_kind(&error), Some(OrmError::Mapping(..))));
        }
    }

    #[tokio::test]
    async fn insert_generates_uuid() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        let store = entity(&schema, "BookStore", &[("name", "MANNING".into())]);
        let result = client
            .save(&mut executor, store, SaveMode::Upsert)
            .await
            .unwrap();
        assert!(result.is_new);
        assert_eq!(
            executor.sql(),
            [
                "select tb_1_.ID\nfrom BOOK_STORE as tb_1_\nwhere tb_1_.NAME = ?",
                "insert into BOOK_STORE(ID, NAME) values(?, ?)",
            ]
        );
        let id = result.entity.id(&schema).unwrap();
        assert!(matches!(id, Value::Uuid(Some(..))));
        assert_eq!(executor.statements()[1].variables[0], id);
    }

    #[tokio::test]
    async fn upsert_finds_the_row_by_key() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "select tb_1_.ID",
            Response::rows(vec![vec![Value::Int64(Some(9))]]),
        );
        let draft = entity(
            &schema,
            "Book",
            &[
                ("name", "Learning GraphQL".into()),
                ("edition", 2.into()),
                ("price", Decimal::new(5500, 2).into()),
            ],
        );
        let result = client
            .save(&mut executor, draft, SaveMode::Upsert)
            .await
            .unwrap();
        assert!(!result.is_new);
        assert_eq!(result.entity.id(&schema).unwrap(), Value::Int64(Some(9)));
        assert_eq!(
            executor.sql(),
            [
                "select tb_1_.ID\nfrom BOOK as tb_1_\nwhere tb_1_.NAME = ? and tb_1_.EDITION = ?",
                "update BOOK set NAME = ?, EDITION = ?, PRICE = ? where ID = ?",
            ]
        );
        assert_eq!(
            executor.statements()[0].variables,
            [
                Value::Varchar(Some("Learning GraphQL".into())),
                Value::Int32(Some(2)),
            ]
        );

        // Partially loaded key, plain insert
        let mut executor = RecordingExecutor::new();
        executor.respond("insert into BOOK", Response::inserted(10));
        let draft = entity(&schema, "Book", &[("name", "Learning GraphQL".into())]);
        let result = client
            .save(&mut executor, draft, SaveMode::Upsert)
            .await
            .unwrap();
        assert!(result.is_new);
        assert_eq!(executor.sql(), ["insert into BOOK(NAME) values(?)"]);
    }

    #[tokio::test]
    async fn upsert_checks_the_id() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();

        let mut executor = RecordingExecutor::new();
        executor.respond("select 1", Response::rows(vec![vec![Value::Int32(Some(1))]]));
        let saved = book(&schema, 7, "Learning GraphQL", 2, Decimal::new(4500, 2));
        let result = client
            .save(&mut executor, saved.clone(), SaveMode::Upsert)
            .await
            .unwrap();
        assert!(!result.is_new);
        assert_eq!(
            executor.sql(),
            [
                "select 1\nfrom BOOK as tb_1_\nwhere tb_1_.ID = ?",
                "update BOOK set NAME = ?, EDITION = ?, PRICE = ? where ID = ?",
            ]
        );
        assert_eq!(
            executor.statements()[1].variables.last(),
            Some(&Value::Int64(Some(7)))
        );

        let mut executor = RecordingExecutor::new();
        let result = client
            .save(&mut executor, saved, SaveMode::Upsert)
            .await
            .unwrap();
        assert!(result.is_new);
        assert_eq!(
            executor.sql()[1],
            "insert into BOOK(ID, NAME, EDITION, PRICE) values(?, ?, ?, ?)"
        );
    }

    #[tokio::test]
    async fn update_requires_the_id() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        let draft = entity(&schema, "Book", &[("name", "Programming TypeScript".into())]);
        silent_logs! {
            let error = client
                .save(&mut executor, draft, SaveMode::Update)
                .await
                .unwrap_err();
            assert!(matches!(error_kind(&error), Some(OrmError::InvalidDraft(..))));
        }
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn update_of_a_missing_row() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond("update BOOK", Response::affected(0));
        let saved = book(&schema, 99, "Effective TypeScript", 1, Decimal::new(3000, 2));
        silent_logs! {
            let error = client
                .save(&mut executor, saved, SaveMode::Update)
                .await
                .unwrap_err();
            assert_eq!(
                error_kind(&error),
                Some(&OrmError::UnexpectedRowCount {
                    expected: 1,
                    actual: 0
                })
            );
        }
    }

    #[tokio::test]
    async fn update_of_the_id_only_writes_nothing() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        let saved = entity(&schema, "Book", &[("id", 5i64.into())]);
        let result = client
            .save(&mut executor, saved, SaveMode::Update)
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 0);
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn interceptor_of_the_mapped_superclass() {
        let schema = bookstore_schema();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let client = SqlClient::builder(schema.clone())
            .interceptor(FnInterceptor::new(
                "Tracked",
                move |draft: &mut Draft<'_>, is_new: bool| -> keel::Result<()> {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let now = datetime!(2025-03-01 10:30);
                    if is_new && !draft.is_loaded("createdTime")? {
                        draft.set("createdTime", now)?;
                    }
                    draft.set("modifiedTime", now)?;
                    Ok(())
                },
            ))
            .build()
            .unwrap();

        let mut executor = RecordingExecutor::new();
        let store = entity(&schema, "BookStore", &[("name", "O'REILLY".into())]);
        let result = client
            .save(&mut executor, store, SaveMode::Insert)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            ["insert into BOOK_STORE(ID, CREATED_TIME, MODIFIED_TIME, NAME) values(?, ?, ?, ?)"]
        );
        let created = schema.prop_key("BookStore", "createdTime").unwrap();
        assert_eq!(
            result.entity.scalar(created),
            Some(&Value::Timestamp(Some(datetime!(2025-03-01 10:30))))
        );

        let mut executor = RecordingExecutor::new();
        let store = entity(
            &schema,
            "BookStore",
            &[("id", keel_tests::OREILLY.into()), ("name", "O'REILLY".into())],
        );
        client
            .save(&mut executor, store, SaveMode::Update)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            ["update BOOK_STORE set MODIFIED_TIME = ?, NAME = ? where ID = ?"]
        );
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn interceptor_failure_stops_the_save() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone())
            .interceptor(FnInterceptor::new(
                "Book",
                |draft: &mut Draft<'_>, _is_new: bool| -> keel::Result<()> {
                    if draft.get_value::<String>("name")?.is_none_or(|v| v.is_empty()) {
                        return Err(OrmError::invalid_draft("a book needs a name"));
                    }
                    Ok(())
                },
            ))
            .build()
            .unwrap();
        let mut executor = RecordingExecutor::new();
        let draft = entity(&schema, "Book", &[("edition", 1.into())]);
        let error = client
            .save(&mut executor, draft, SaveMode::Insert)
            .await
            .unwrap_err();
        assert!(matches!(error_kind(&error), Some(OrmError::InvalidDraft(..))));
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn many_to_many_is_synchronised() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let author_ty = schema.find_type("Author").unwrap();
        let mut draft = Draft::new(&schema, "Book").unwrap();
        draft.set("id", 10i64).unwrap();
        draft
            .set_list(
                "authors",
                vec![
                    Entity::id_only(author_ty, 1i64.into()).unwrap(),
                    Entity::id_only(author_ty, 3i64.into()).unwrap(),
                ],
            )
            .unwrap();
        let (saved, _) = draft.resolve();

        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from BOOK_AUTHOR_MAPPING",
            Response::rows(vec![
                vec![Value::Int64(Some(10)), Value::Int64(Some(1))],
                vec![Value::Int64(Some(10)), Value::Int64(Some(2))],
            ]),
        );
        let result = client
            .save(&mut executor, saved, SaveMode::Update)
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 0);
        assert_eq!(
            executor.sql(),
            [
                "select BOOK_ID, AUTHOR_ID from BOOK_AUTHOR_MAPPING where BOOK_ID in (?)",
                "delete from BOOK_AUTHOR_MAPPING where (BOOK_ID, AUTHOR_ID) in ((?, ?))",
                "insert into BOOK_AUTHOR_MAPPING(BOOK_ID, AUTHOR_ID) values(?, ?)",
            ]
        );
        assert_eq!(
            executor.statements()[1].variables,
            [Value::Int64(Some(10)), Value::Int64(Some(2))]
        );
        assert_eq!(
            executor.statements()[2].variables,
            [Value::Int64(Some(10)), Value::Int64(Some(3))]
        );
    }

    #[tokio::test]
    async fn new_entity_inserts_its_middle_rows() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let book_ty = schema.find_type("Book").unwrap();
        let mut draft = Draft::new(&schema, "Author").unwrap();
        draft
            .set("id", 4i64)
            .unwrap()
            .set("firstName", "Boris")
            .unwrap()
            .set("lastName", "Cherny")
            .unwrap()
            .set_list(
                "books",
                vec![
                    Entity::id_only(book_ty, 7i64.into()).unwrap(),
                    Entity::id_only(book_ty, 8i64.into()).unwrap(),
                ],
            )
            .unwrap();
        let (saved, _) = draft.resolve();
        let mut executor = RecordingExecutor::new();
        client
            .save(&mut executor, saved, SaveMode::Insert)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            [
                "insert into AUTHOR(ID, FIRST_NAME, LAST_NAME) values(?, ?, ?)",
                "insert into BOOK_AUTHOR_MAPPING(AUTHOR_ID, BOOK_ID) values(?, ?), (?, ?)",
            ]
        );
    }

    #[tokio::test]
    async fn one_to_many_lists_are_not_saved() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let book_ty = schema.find_type("Book").unwrap();
        let mut draft = Draft::new(&schema, "BookStore").unwrap();
        draft
            .set("id", keel_tests::MANNING)
            .unwrap()
            .set_list("books", vec![Entity::id_only(book_ty, 1i64.into()).unwrap()])
            .unwrap();
        let (saved, _) = draft.resolve();
        let mut executor = RecordingExecutor::new();
        silent_logs! {
            client
                .save(&mut executor, saved, SaveMode::Update)
                .await
                .unwrap();
        }
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn delete_clears_the_middle_table_first() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond("delete from BOOK where", Response::affected(2));
        let deleted = client
            .delete_by_ids(&mut executor, "Book", [1i64, 2, 1])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            executor.sql(),
            [
                "delete from BOOK_AUTHOR_MAPPING where BOOK_ID in (?, ?)",
                "delete from BOOK where ID in (?, ?)",
            ]
        );

        let mut executor = RecordingExecutor::new();
        client
            .delete_by_ids(&mut executor, "Author", [5i64])
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            [
                "delete from BOOK_AUTHOR_MAPPING where AUTHOR_ID in (?)",
                "delete from AUTHOR where ID in (?)",
            ]
        );

        let mut executor = RecordingExecutor::new();
        let deleted = client
            .delete_by_ids(&mut executor, "Book", Vec::<i64>::new())
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(executor.statements().is_empty());
    }
}
