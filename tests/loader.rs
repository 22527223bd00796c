#[cfg(test)]
mod tests {
    use keel::{MemoryCacheFactory, OrmError, SaveMode, SqlClient, Value, error_kind};
    use keel_tests::{MANNING, RecordingExecutor, Response, author, bookstore_schema};

    fn author_row(book: i64, id: i64, first_name: &str, last_name: &str) -> Vec<Value> {
        vec![
            Value::Int64(Some(book)),
            Value::Int64(Some(id)),
            Value::Varchar(Some(first_name.into())),
            Value::Varchar(Some(last_name.into())),
        ]
    }

    const AUTHORS_OF_BOOKS: &str = "select tb_2_.BOOK_ID, tb_1_.ID, tb_1_.FIRST_NAME, tb_1_.LAST_NAME
from AUTHOR as tb_1_
inner join BOOK_AUTHOR_MAPPING as tb_2_ on tb_1_.ID = tb_2_.AUTHOR_ID
where tb_2_.BOOK_ID in";

    #[tokio::test]
    async fn many_to_many_in_one_statement() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from AUTHOR",
            Response::rows(vec![
                author_row(1, 10, "Alex", "Banks"),
                author_row(1, 11, "Eve", "Porcello"),
                author_row(2, 10, "Alex", "Banks"),
            ]),
        );
        let loaded = client
            .list_loader("Book", "authors")
            .unwrap()
            .batch_load(&mut executor, [1i64, 2, 3])
            .await
            .unwrap();
        assert_eq!(executor.sql(), [format!("{AUTHORS_OF_BOOKS} (?, ?, ?)")]);
        let ids = |book: i64| {
            loaded[&Value::Int64(Some(book))]
                .iter()
                .map(|v| v.id(&schema).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(loaded.len(), 3);
        assert_eq!(ids(1), [Value::Int64(Some(10)), Value::Int64(Some(11))]);
        assert_eq!(ids(2), [Value::Int64(Some(10))]);
        assert!(ids(3).is_empty());
        assert_eq!(
            loaded[&Value::Int64(Some(1))][0],
            author(&schema, 10, "Alex", "Banks")
        );
    }

    #[tokio::test]
    async fn sources_are_split_in_batches() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone())
            .batch_size(2)
            .build()
            .unwrap();
        let mut executor = RecordingExecutor::new();
        let loaded = client
            .list_loader("Book", "authors")
            .unwrap()
            .batch_load(&mut executor, [1i64, 2, 3, 2])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            executor.sql(),
            [
                format!("{AUTHORS_OF_BOOKS} (?, ?)"),
                format!("{AUTHORS_OF_BOOKS} (?)"),
            ]
        );

        let mut executor = RecordingExecutor::new();
        let loaded = client
            .list_loader("Book", "authors")
            .unwrap()
            .batch_load(&mut executor, Vec::<i64>::new())
            .await
            .unwrap();
        assert!(loaded.is_empty());
        assert_eq!(executor.statements().len(), 1);
        assert!(executor.sql()[0].ends_with("where 1 = 0"));
    }

    #[tokio::test]
    async fn fifty_sources_fit_the_default_batch() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        let loaded = client
            .list_loader("Book", "authors")
            .unwrap()
            .batch_load(&mut executor, 1..=50i64)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 50);
        assert_eq!(executor.statements().len(), 1);
        assert_eq!(executor.statements()[0].variables.len(), 50);
        assert!(executor.sql()[0].starts_with(AUTHORS_OF_BOOKS));
    }

    #[tokio::test]
    async fn one_to_many_reads_the_foreign_key() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from BOOK",
            Response::rows(vec![vec![
                Value::Uuid(Some(MANNING)),
                Value::Int64(Some(1)),
                Value::Varchar(Some("GraphQL in Action".into())),
                Value::Int32(Some(1)),
                Value::Decimal(Some(80.into())),
                Value::Uuid(Some(MANNING)),
            ]]),
        );
        let books = client
            .list_loader("BookStore", "books")
            .unwrap()
            .load(&mut executor, MANNING)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            ["select tb_1_.STORE_ID, tb_1_.ID, tb_1_.NAME, tb_1_.EDITION, tb_1_.PRICE, tb_1_.STORE_ID\nfrom BOOK as tb_1_\nwhere tb_1_.STORE_ID in (?)"]
        );
        assert_eq!(books.len(), 1);
        let store = schema.prop_key("Book", "store").unwrap();
        assert_eq!(
            books[0].reference(store).map(|v| v.id(&schema).unwrap()),
            Some(Value::Uuid(Some(MANNING)))
        );
    }

    #[tokio::test]
    async fn filtered_list() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        client
            .list_loader("Book", "authors")
            .unwrap()
            .filter(|query, author| {
                query
                    .filter(author.get("lastName").ne("Banks"))
                    .order_by(author.get("firstName").asc());
                Ok(())
            })
            .load(&mut executor, 1i64)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            [format!(
                "{AUTHORS_OF_BOOKS} (?) and tb_1_.LAST_NAME <> ?\norder by tb_1_.FIRST_NAME asc"
            )]
        );
    }

    #[tokio::test]
    async fn nullable_reference() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from BOOK",
            Response::rows(vec![
                vec![
                    Value::Int64(Some(1)),
                    Value::Uuid(Some(MANNING)),
                    Value::Null,
                    Value::Null,
                    Value::Varchar(Some("MANNING".into())),
                    Value::Null,
                ],
                vec![
                    Value::Int64(Some(2)),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
            ]),
        );
        let stores = client
            .reference_loader("Book", "store")
            .unwrap()
            .batch_load(&mut executor, [1i64, 2])
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            ["select tb_1_.ID, tb_2_.ID, tb_2_.CREATED_TIME, tb_2_.MODIFIED_TIME, tb_2_.NAME, tb_2_.WEBSITE\nfrom BOOK as tb_1_\nleft join BOOK_STORE as tb_2_ on tb_1_.STORE_ID = tb_2_.ID\nwhere tb_1_.ID in (?, ?)"]
        );
        let name = schema.prop_key("BookStore", "name").unwrap();
        assert_eq!(
            stores[&Value::Int64(Some(1))]
                .as_ref()
                .and_then(|v| v.scalar(name)),
            Some(&Value::Varchar(Some("MANNING".into())))
        );
        assert_eq!(stores[&Value::Int64(Some(2))], None);
    }

    #[tokio::test]
    async fn non_null_reference_rejects_filters() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let result = client
            .reference_loader("Chapter", "book")
            .unwrap()
            .filter(|_, _| Ok(()));
        let Err(error) = result else {
            panic!("a filter on a non null reference must be rejected");
        };
        assert!(matches!(error_kind(&error), Some(OrmError::Unsupported(..))));

        let mut executor = RecordingExecutor::new();
        client
            .reference_loader("Chapter", "book")
            .unwrap()
            .load(&mut executor, 1i64)
            .await
            .unwrap();
        assert_eq!(
            executor.sql(),
            ["select tb_1_.ID, tb_2_.ID, tb_2_.NAME, tb_2_.EDITION, tb_2_.PRICE, tb_2_.STORE_ID\nfrom CHAPTER as tb_1_\ninner join BOOK as tb_2_ on tb_1_.BOOK_ID = tb_2_.ID\nwhere tb_1_.ID in (?)"]
        );
    }

    #[tokio::test]
    async fn loaders_need_the_right_prop() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        assert!(client.list_loader("Book", "store").is_err());
        assert!(client.reference_loader("Book", "authors").is_err());
        assert!(client.list_loader("Book", "unknown").is_err());
    }

    #[tokio::test]
    async fn objects_come_from_the_cache() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone())
            .cache_factory(MemoryCacheFactory)
            .build()
            .unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "from AUTHOR",
            Response::rows(vec![
                vec![
                    Value::Int64(Some(1)),
                    Value::Varchar(Some("Alex".into())),
                    Value::Varchar(Some("Banks".into())),
                ],
                vec![
                    Value::Int64(Some(2)),
                    Value::Varchar(Some("Eve".into())),
                    Value::Varchar(Some("Porcello".into())),
                ],
            ]),
        );
        let found = client
            .find_by_ids(&mut executor, "Author", [1i64, 2])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            executor.sql(),
            ["select tb_1_.ID, tb_1_.FIRST_NAME, tb_1_.LAST_NAME\nfrom AUTHOR as tb_1_\nwhere tb_1_.ID in (?, ?)"]
        );

        executor.clear();
        let found = client
            .find_by_ids(&mut executor, "Author", [2i64, 3, 1])
            .await
            .unwrap();
        assert_eq!(
            found,
            [
                author(&schema, 2, "Eve", "Porcello"),
                author(&schema, 1, "Alex", "Banks"),
            ]
        );
        assert_eq!(executor.statements().len(), 1);
        assert_eq!(
            executor.statements()[0].variables,
            [Value::Int64(Some(3))]
        );

        // A save evicts the entry
        executor.clear();
        client
            .save(&mut executor, author(&schema, 1, "Alex", "Banks"), SaveMode::Update)
            .await
            .unwrap();
        executor.clear();
        assert!(
            client
                .find_by_id(&mut executor, "Author", 1i64)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(executor.statements().len(), 1);
    }

    #[tokio::test]
    async fn association_cache() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone())
            .cache_factory(MemoryCacheFactory)
            .build()
            .unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "inner join BOOK_AUTHOR_MAPPING",
            Response::rows(vec![author_row(1, 10, "Alex", "Banks")]),
        );
        let loader = client.list_loader("Book", "authors").unwrap();
        let first = loader.load(&mut executor, 1i64).await.unwrap();
        assert_eq!(first, [author(&schema, 10, "Alex", "Banks")]);
        assert_eq!(executor.statements().len(), 1);

        // Target ids are cached, the targets are read by id
        executor.clear();
        executor.respond(
            "from AUTHOR as tb_1_\nwhere tb_1_.ID in",
            Response::rows(vec![vec![
                Value::Int64(Some(10)),
                Value::Varchar(Some("Alex".into())),
                Value::Varchar(Some("Banks".into())),
            ]]),
        );
        let second = loader.load(&mut executor, 1i64).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(
            executor.sql(),
            ["select tb_1_.ID, tb_1_.FIRST_NAME, tb_1_.LAST_NAME\nfrom AUTHOR as tb_1_\nwhere tb_1_.ID in (?)"]
        );

        executor.clear();
        assert_eq!(loader.load(&mut executor, 1i64).await.unwrap(), first);
        assert!(executor.statements().is_empty());

        // A new pair evicts the source
        client
            .associations("Book", "authors")
            .unwrap()
            .insert(&mut executor, [(1i64, 11i64)])
            .await
            .unwrap();
        executor.clear();
        loader.load(&mut executor, 1i64).await.unwrap();
        assert_eq!(executor.sql(), [format!("{AUTHORS_OF_BOOKS} (?)")]);
    }
}
