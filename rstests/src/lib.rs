//! Shared fixtures for the end-to-end tests.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quarry_core::adapter::memory::MemoryAdapter;
use quarry_core::adapter::{Adapter, Relation};
use quarry_core::errors::{QuarryError, Result};
use quarry_core::execution::collect_rows;
use quarry_core::functions::table::{ResolvedArg, SimpleTableFunction, TableFunctionInput};
use quarry_core::logical::cursor::Cursor;
use quarry_core::logical::operator::TableFunctionArg;
use quarry_core::rewrite::pushdown::{KeyFields, push_key_predicates};
use quarry_core::row;
use quarry_core::{
    DataType, Dataset, ExecutionConfig, Field, FieldMode, LogicalOperator, Row, Schema, Value,
};
use tracing::trace;

pub fn employee_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Integer),
        Field::new("name", DataType::String),
        Field::new("manager_id", DataType::Integer),
    ]
}

pub fn employee_rows() -> Vec<Row> {
    vec![
        row![1234, "Tom", Value::Null],
        row![4567, "Sally", 1234],
        row![8901, "Mark", 1234],
    ]
}

/// Memory adapter with `employees` and a few other small tables.
pub fn memory_adapter() -> MemoryAdapter {
    let adapter = MemoryAdapter::new("memory")
        .with_table("employees", employee_fields(), employee_rows())
        .and_then(|adapter| {
            adapter.with_table(
                "departments",
                vec![
                    Field::new("manager_id", DataType::Integer),
                    Field::new("department", DataType::String),
                ],
                vec![row![1234, "engineering"], row![4567, "sales"], row![9999, "legal"]],
            )
        })
        .and_then(|adapter| {
            adapter.with_table(
                "teams",
                vec![
                    Field::new("team", DataType::String),
                    Field::new("members", DataType::String).with_mode(FieldMode::Repeated),
                    Field::new("leads", DataType::Record)
                        .with_mode(FieldMode::Repeated)
                        .with_fields(vec![
                            Field::new("name", DataType::String),
                            Field::new("since", DataType::Integer),
                        ]),
                ],
                vec![
                    row![
                        "core",
                        vec!["Tom", "Sally"],
                        Value::List(vec![Value::Record(vec![
                            ("name".to_string(), Value::from("Tom")),
                            ("since".to_string(), Value::from(2019)),
                        ])])
                    ],
                    row!["ops", vec!["Mark"]],
                ],
            )
        });

    match adapter {
        Ok(adapter) => adapter,
        Err(e) => panic!("invalid fixture: {e}"),
    }
}

/// Dataset with builtin functions and the memory adapter.
pub fn employees() -> Arc<Dataset> {
    logutil::init_test();
    let dataset = Dataset::with_builtins();
    dataset.add_adapter(Arc::new(memory_adapter()));
    Arc::new(dataset)
}

/// Execute `op` against `dataset`, collecting all rows.
pub fn run(dataset: &Arc<Dataset>, op: LogicalOperator) -> Result<Vec<Row>> {
    collect_rows(dataset.query(op)?.execute(Vec::new())?)
}

pub fn run_with_config(
    dataset: &Arc<Dataset>,
    op: LogicalOperator,
    config: ExecutionConfig,
) -> Result<Vec<Row>> {
    collect_rows(dataset.query(op)?.execute_with_config(Vec::new(), config)?)
}

/// Sort rows so results can be compared as multisets.
pub fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

/// A stored document, addressed by its path.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub year: String,
    pub title: String,
    pub size: i64,
}

impl Document {
    pub fn new(year: &str, name: &str, title: &str, size: i64) -> Self {
        Document {
            path: format!("{year}/{name}.json"),
            year: year.to_string(),
            title: title.to_string(),
            size,
        }
    }
}

pub const DOCUMENTS: &str = "docs";
pub const KEYS_FUNCTION: &str = "doc_keys";
pub const DECODE_FUNCTION: &str = "doc_decode";
const KEY_FIELDS: &[&str] = &["path", "year"];

fn key_fields() -> Vec<Field> {
    vec![
        Field::new("path", DataType::String).with_mode(FieldMode::Required),
        Field::new("year", DataType::String).with_mode(FieldMode::Required),
    ]
}

fn record_fields() -> Vec<Field> {
    vec![
        Field::new("title", DataType::String),
        Field::new("size", DataType::Integer),
    ]
}

pub fn document_fields() -> Vec<Field> {
    key_fields().into_iter().chain(record_fields()).collect()
}

pub fn document_row(doc: &Document) -> Row {
    row![
        doc.path.as_str(),
        doc.year.as_str(),
        doc.title.as_str(),
        doc.size
    ]
}

/// Adapter over documents where listing keys is cheap and decoding a
/// document is not.
///
/// Loads of `docs` are rewritten to `doc_decode(doc_keys())`, with key
/// predicates moved between the two.
#[derive(Debug)]
pub struct DocumentAdapter {
    documents: Arc<Vec<Document>>,
    decoded: Arc<AtomicUsize>,
}

impl DocumentAdapter {
    pub fn new(documents: Vec<Document>) -> Self {
        DocumentAdapter {
            documents: Arc::new(documents),
            decoded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of documents decoded so far.
    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Register the key and decode functions with `dataset`.
    pub fn register(&self, dataset: &Dataset) {
        let documents = self.documents.clone();
        dataset.register_table_function(SimpleTableFunction::new(
            KEYS_FUNCTION,
            |_args| Ok(Schema::named(DOCUMENTS, key_fields())),
            move |_ctx, _args| {
                let keys: Vec<Result<Row>> = documents
                    .iter()
                    .map(|doc| Ok(row![doc.path.as_str(), doc.year.as_str()]))
                    .collect();
                Ok(Box::new(keys.into_iter()))
            },
        ));

        let documents = self.documents.clone();
        let decoded = self.decoded.clone();
        dataset.register_table_function(SimpleTableFunction::new(
            DECODE_FUNCTION,
            |args| match args {
                [ResolvedArg::Relation(_)] => Ok(Schema::named(DOCUMENTS, document_fields())),
                _ => Err(QuarryError::Execution(
                    "doc_decode expects a key relation".to_string(),
                )),
            },
            move |ctx, args| {
                let [TableFunctionInput::Relation { operator, .. }] = args else {
                    return Err(QuarryError::Execution(
                        "doc_decode expects a key relation".to_string(),
                    ));
                };
                let documents = documents.clone();
                let decoded = decoded.clone();
                let keys = operator.execute(ctx)?;
                Ok(Box::new(keys.map(move |key| -> Result<Row> {
                    let key = key?;
                    let doc = documents
                        .iter()
                        .find(|doc| Some(doc.path.as_str()) == key[0].as_str())
                        .ok_or_else(|| QuarryError::Execution(format!("no document at {}", key[0])))?;
                    decoded.fetch_add(1, Ordering::Relaxed);
                    Ok(document_row(doc))
                })))
            },
        ));
    }
}

impl Adapter for DocumentAdapter {
    fn name(&self) -> &str {
        "documents"
    }

    fn relations(&self) -> Vec<(String, Schema)> {
        vec![(DOCUMENTS.to_string(), Schema::named(DOCUMENTS, document_fields()))]
    }

    fn schema(&self, name: &str) -> Option<Schema> {
        (name == DOCUMENTS).then(|| Schema::named(DOCUMENTS, document_fields()))
    }

    fn get_relation(&self, _name: &str) -> Option<Relation> {
        // Loads are always rewritten by `evaluate`.
        None
    }

    fn evaluate(&self, cursor: &mut Cursor) -> Result<()> {
        cursor.replace(LogicalOperator::table_function(KEYS_FUNCTION, Vec::new()));
        push_key_predicates(cursor, KeyFields::new(DOCUMENTS, KEY_FIELDS))?;
        cursor.replace_with(|keys| {
            trace!(%keys, "decoding documents");
            Ok(LogicalOperator::table_function(
                DECODE_FUNCTION,
                vec![TableFunctionArg::Relation(keys)],
            ))
        })?;
        cursor.leftmost_descendant()
    }
}

pub fn documents() -> Vec<Document> {
    vec![
        Document::new("2022", "alpha", "Alpha", 10),
        Document::new("2023", "beta", "Beta", 200),
        Document::new("2023", "gamma", "Gamma", 30),
        Document::new("2024", "delta", "Delta", 400),
        Document::new("2024", "epsilon", "Epsilon", 5),
    ]
}

/// The same documents served through the pushdown adapter and, in a second
/// dataset, as a plain memory table. Both call the relation `docs`.
pub fn document_datasets() -> (Arc<Dataset>, Arc<DocumentAdapter>, Arc<Dataset>) {
    logutil::init_test();
    let docs = documents();

    let adapter = Arc::new(DocumentAdapter::new(docs.clone()));
    let pushed = Dataset::with_builtins();
    adapter.register(&pushed);
    pushed.add_adapter(adapter.clone());

    let plain = Dataset::with_builtins();
    let table = MemoryAdapter::new("memory").with_table(
        DOCUMENTS,
        document_fields(),
        docs.iter().map(document_row).collect(),
    );
    match table {
        Ok(table) => plain.add_adapter(Arc::new(table)),
        Err(e) => panic!("invalid fixture: {e}"),
    }

    (Arc::new(pushed), adapter, Arc::new(plain))
}
