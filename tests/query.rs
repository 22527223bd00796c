#[cfg(test)]
mod tests {
    use indoc::indoc;
    use keel::{
        Entity, OrmError, PostgresSqlWriter, SqlClient, Value, count_all, error_kind, exists,
        lit_int,
    };
    use keel_tests::{MANNING, RecordingExecutor, Response, bookstore_schema};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn fetch_tuples() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from BOOK",
            Response::rows(vec![
                vec![
                    Value::Varchar(Some("GraphQL in Action".into())),
                    Value::Varchar(Some("MANNING".into())),
                ],
                vec![Value::Varchar(Some("Programming TypeScript".into())), Value::Null],
            ]),
        );
        let mut query = client.query("Book").unwrap();
        let book = query.root();
        let store = query.outer_join(book, "store").unwrap();
        query
            .select(book.get("name"))
            .select(store.get("name"))
            .filter(book.get("price").ge(Value::Decimal(Some(Decimal::new(4000, 2)))))
            .order_by(book.get("name").asc());
        let rows = query
            .fetch::<(String, Option<String>), _>(&mut executor)
            .await
            .unwrap();
        assert_eq!(
            rows,
            [
                ("GraphQL in Action".to_string(), Some("MANNING".to_string())),
                ("Programming TypeScript".to_string(), None),
            ]
        );
        assert_eq!(
            executor.sql(),
            [indoc! {"
                select tb_1_.NAME, tb_2_.NAME
                from BOOK as tb_1_
                left join BOOK_STORE as tb_2_ on tb_1_.STORE_ID = tb_2_.ID
                where tb_1_.PRICE >= ?
                order by tb_1_.NAME asc"}]
        );
    }

    #[tokio::test]
    async fn fetch_one_and_optional() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut query = client.query("BookStore").unwrap();
        let store = query.root();
        query.filter(store.get("id").eq(MANNING));

        let mut executor = RecordingExecutor::new();
        assert_eq!(
            query
                .fetch_optional::<Entity, _>(&mut executor)
                .await
                .unwrap(),
            None
        );
        let error = query
            .fetch_one::<Entity, _>(&mut executor)
            .await
            .unwrap_err();
        assert_eq!(
            error_kind(&error),
            Some(&OrmError::UnexpectedRowCount {
                expected: 1,
                actual: 0
            })
        );

        executor.respond(
            "from BOOK_STORE",
            Response::rows(vec![vec![
                Value::Uuid(Some(MANNING)),
                Value::Null,
                Value::Null,
                Value::Varchar(Some("MANNING".into())),
                Value::Varchar(Some("https://www.manning.com".into())),
            ]]),
        );
        let found = query.fetch_one::<Entity, _>(&mut executor).await.unwrap();
        assert_eq!(found.id(&schema).unwrap(), Value::Uuid(Some(MANNING)));
        let website = schema.prop_key("BookStore", "website").unwrap();
        assert_eq!(
            found.value::<Option<String>>(website).unwrap().as_deref(),
            Some("https://www.manning.com")
        );
    }

    #[tokio::test]
    async fn count_rows() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond("count(*)", Response::rows(vec![vec![Value::Int64(Some(12))]]));
        let mut query = client.query("BookStore").unwrap();
        let store = query.root();
        let sub = query.sub_query("Book").unwrap();
        let book = sub.root();
        let sub = sub
            .select(lit_int(1))
            .filter(book.get("store").eq(store.get("id")));
        query.filter(exists(sub)).order_by(store.get("name").asc()).limit(5);
        assert_eq!(query.count(&mut executor).await.unwrap(), 12);
        assert_eq!(
            executor.sql(),
            [indoc! {"
                select count(*)
                from BOOK_STORE as tb_1_
                where exists(select 1 from BOOK as tb_2_ where tb_2_.STORE_ID = tb_1_.ID)"}]
        );
    }

    #[tokio::test]
    async fn dialect_of_the_executor() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::<PostgresSqlWriter>::with_dialect();
        let mut query = client.query("Author").unwrap();
        let author = query.root();
        query
            .select(count_all())
            .filter(author.get("firstName").eq("Alex"))
            .filter(author.get("lastName").ne("Banks"));
        query.fetch::<Value, _>(&mut executor).await.unwrap();
        assert_eq!(
            executor.sql(),
            [indoc! {"
                select count(*)
                from AUTHOR as tb_1_
                where tb_1_.FIRST_NAME = $1 and tb_1_.LAST_NAME <> $2"}]
        );
    }

    #[tokio::test]
    async fn executor_errors_are_returned() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond("from AUTHOR", Response::Error("connection reset".into()));
        let query = client.query("Author").unwrap();
        keel_tests::silent_logs! {
            let error = query.fetch::<Entity, _>(&mut executor).await.unwrap_err();
            assert!(format!("{error:#}").contains("connection reset"));
            assert!(error_kind(&error).is_none());
        }
    }
}
