#[cfg(test)]
mod tests {
    use keel::{SqlClient, Value};
    use keel_tests::{RecordingExecutor, Response, bookstore_schema};

    #[tokio::test]
    async fn insert_and_delete_pairs() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let commands = client.associations("Book", "authors").unwrap();
        let mut executor = RecordingExecutor::new();
        let inserted = commands
            .insert(&mut executor, [(1i64, 10i64), (1, 11), (1, 10)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        executor.respond("delete from", Response::affected(1));
        let deleted = commands
            .delete(&mut executor, [(1i64, 11i64)])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            executor.sql(),
            [
                "insert into BOOK_AUTHOR_MAPPING(BOOK_ID, AUTHOR_ID) values(?, ?), (?, ?)",
                "delete from BOOK_AUTHOR_MAPPING where (BOOK_ID, AUTHOR_ID) in ((?, ?))",
            ]
        );
        assert_eq!(
            executor.statements()[0].variables,
            [
                Value::Int64(Some(1)),
                Value::Int64(Some(10)),
                Value::Int64(Some(1)),
                Value::Int64(Some(11)),
            ]
        );

        executor.clear();
        assert_eq!(
            commands
                .delete(&mut executor, Vec::<(i64, i64)>::new())
                .await
                .unwrap(),
            0
        );
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn check_and_insert_skips_existing_pairs() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        let mut executor = RecordingExecutor::new();
        executor.respond(
            "select AUTHOR_ID, BOOK_ID",
            Response::rows(vec![vec![Value::Int64(Some(10)), Value::Int64(Some(1))]]),
        );
        let inserted = client
            .associations("Author", "books")
            .unwrap()
            .check_and_insert(&mut executor, [(10i64, 1i64), (10, 2)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(
            executor.sql(),
            [
                "select AUTHOR_ID, BOOK_ID from BOOK_AUTHOR_MAPPING where (AUTHOR_ID, BOOK_ID) in ((?, ?), (?, ?))",
                "insert into BOOK_AUTHOR_MAPPING(AUTHOR_ID, BOOK_ID) values(?, ?)",
            ]
        );
        assert_eq!(
            executor.statements()[1].variables,
            [Value::Int64(Some(10)), Value::Int64(Some(2))]
        );
    }

    #[test]
    fn only_many_to_many_props() {
        let schema = bookstore_schema();
        let client = SqlClient::builder(schema.clone()).build().unwrap();
        assert!(client.associations("Book", "store").is_err());
        assert!(client.associations("BookStore", "books").is_err());
        let middle = client
            .associations("Author", "books")
            .unwrap()
            .middle_table()
            .clone();
        assert_eq!(middle.table, "BOOK_AUTHOR_MAPPING");
        assert_eq!(middle.join_column, "AUTHOR_ID");
        assert_eq!(middle.target_column, "BOOK_ID");
    }
}
