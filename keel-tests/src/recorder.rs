use async_stream::try_stream;
use keel::{
    Driver, Error, Executor, GenericSqlWriter, QueryResult, Result, RowLabeled, RowNames,
    RowsAffected, Value,
    stream::{Stream, TryStreamExt},
    writer::{SqlWriter, Statement},
};
use std::{collections::VecDeque, marker::PhantomData, sync::Arc};

#[derive(Default, Debug, Clone, Copy)]
pub struct RecordingDriver<W = GenericSqlWriter>(PhantomData<W>);

impl<W> Driver for RecordingDriver<W>
where
    W: SqlWriter + Default + Send + Sync,
{
    type SqlWriter = W;

    const NAME: &'static str = "recording";

    fn sql_writer(&self) -> Self::SqlWriter {
        W::default()
    }
}

/// Scripted answer to a statement.
#[derive(Debug, Clone)]
pub enum Response {
    Rows { labels: RowNames, rows: Vec<Vec<Value>> },
    Affected(RowsAffected),
    Error(String),
}

impl Response {
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            labels: Arc::from(Vec::<String>::new()),
            rows,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self::Affected(RowsAffected {
            rows_affected,
            last_affected_id: None,
        })
    }

    pub fn inserted(last_affected_id: i64) -> Self {
        Self::Affected(RowsAffected {
            rows_affected: 1,
            last_affected_id: Some(last_affected_id),
        })
    }
}

/// Executor that records every statement and replays scripted responses.
///
/// A scripted response is consumed by the first statement whose sql contains its pattern.
/// Without a match a select returns no row, an insert reports one affected row per values
/// tuple and any other statement reports one affected row.
#[derive(Default, Debug)]
pub struct RecordingExecutor<W = GenericSqlWriter> {
    driver: RecordingDriver<W>,
    script: VecDeque<(String, Response)>,
    statements: Vec<Statement>,
}

impl RecordingExecutor<GenericSqlWriter> {
    pub fn new() -> Self {
        Self::with_dialect()
    }
}

impl<W> RecordingExecutor<W> {
    pub fn with_dialect() -> Self {
        Self {
            driver: RecordingDriver(PhantomData),
            script: VecDeque::new(),
            statements: Vec::new(),
        }
    }

    pub fn respond(&mut self, pattern: impl Into<String>, response: Response) -> &mut Self {
        self.script.push_back((pattern.into(), response));
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|v| v.sql.as_str()).collect()
    }

    /// Forgets the recorded statements, the script is kept.
    pub fn clear(&mut self) {
        self.statements.clear();
    }

    /// Scripted responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.script.len()
    }

    fn response_to(&mut self, statement: &Statement) -> Response {
        let scripted = self
            .script
            .iter()
            .position(|(pattern, _)| statement.sql.contains(pattern.as_str()));
        if let Some((_, response)) = scripted.and_then(|i| self.script.remove(i)) {
            return response;
        }
        if statement.is_select() {
            Response::rows(Vec::new())
        } else if statement.sql.starts_with("insert") {
            let tuples = statement
                .sql
                .split_once(" values")
                .map(|(_, v)| v.matches('(').count())
                .unwrap_or(1);
            Response::affected(tuples as u64)
        } else {
            Response::affected(1)
        }
    }
}

impl<W> Executor for RecordingExecutor<W>
where
    W: SqlWriter + Default + Send + Sync,
{
    type Driver = RecordingDriver<W>;

    fn driver(&self) -> &Self::Driver {
        &self.driver
    }

    fn run(&mut self, statement: Statement) -> impl Stream<Item = Result<QueryResult>> + Send {
        let response = self.response_to(&statement);
        let context = Arc::new(format!("While running the statement:\n{}", statement.sql));
        self.statements.push(statement);
        try_stream! {
            match response {
                Response::Rows { labels, rows } => {
                    for row in rows {
                        yield QueryResult::Row(RowLabeled::new(labels.clone(), row.into()));
                    }
                }
                Response::Affected(affected) => {
                    yield QueryResult::Affected(affected);
                }
                Response::Error(message) => {
                    Err::<(), _>(Error::msg(message))?;
                }
            }
        }
        .map_err(move |e: Error| {
            let error = e.context(context.clone());
            log::error!("{:#}", error);
            error
        })
    }
}
