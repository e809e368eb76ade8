use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMicrosecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::debug;

use crate::error::{RecollectError, Result};
use crate::storage::filter::TextFilter;
use crate::storage::{DirectSearch, MemorySet, StoredMemory};

pub struct LanceStore {
    connection: Connection,
    short_term_table: Option<Table>,
    long_term_table: Option<Table>,
}

impl LanceStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| RecollectError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            short_term_table: None,
            long_term_table: None,
        })
    }

    /// Connect, creating the directory if needed, and make sure both tables exist
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let mut store = Self::connect(path).await?;
        for set in MemorySet::ALL {
            if store.table_exists(set.table_name()).await? {
                store.open_table(set).await?;
            } else {
                store.create_table(set).await?;
            }
        }
        Ok(store)
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("user_id", DataType::Utf8, false),
            Field::new("searchable_content", DataType::Utf8, true),
            Field::new("summary", DataType::Utf8, true),
            Field::new("processed_data", DataType::Utf8, true),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    pub async fn create_table(&mut self, set: MemorySet) -> Result<()> {
        let schema = Self::schema();
        let batch = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self
            .connection
            .create_table(set.table_name(), Box::new(batches))
            .execute()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to create {set} table: {e}")))?;

        self.set_table(set, table);
        Ok(())
    }

    pub async fn open_table(&mut self, set: MemorySet) -> Result<()> {
        let table = self
            .connection
            .open_table(set.table_name())
            .execute()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to open {set} table: {e}")))?;

        self.set_table(set, table);
        Ok(())
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == name))
    }

    fn set_table(&mut self, set: MemorySet, table: Table) {
        match set {
            MemorySet::ShortTerm => self.short_term_table = Some(table),
            MemorySet::LongTerm => self.long_term_table = Some(table),
        }
    }

    fn table(&self, set: MemorySet) -> Result<&Table> {
        let table = match set {
            MemorySet::ShortTerm => self.short_term_table.as_ref(),
            MemorySet::LongTerm => self.long_term_table.as_ref(),
        };
        table.ok_or_else(|| RecollectError::Storage(format!("{set} table not initialized")))
    }

    /// Convert rows of one set to an Arrow RecordBatch
    fn memories_to_batch(memories: &[&StoredMemory], schema: Arc<Schema>) -> Result<RecordBatch> {
        let ids: Vec<&str> = memories.iter().map(|m| m.id.as_str()).collect();
        let user_ids: Vec<&str> = memories.iter().map(|m| m.user_id.as_str()).collect();
        let searchable: Vec<Option<&str>> = memories
            .iter()
            .map(|m| m.searchable_content.as_deref())
            .collect();
        let summaries: Vec<Option<&str>> =
            memories.iter().map(|m| m.summary.as_deref()).collect();
        let processed: Vec<Option<&str>> = memories
            .iter()
            .map(|m| m.processed_data.as_deref())
            .collect();
        let created_at: Vec<i64> = memories
            .iter()
            .map(|m| m.created_at.timestamp_micros())
            .collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(user_ids)),
                Arc::new(StringArray::from(searchable)),
                Arc::new(StringArray::from(summaries)),
                Arc::new(StringArray::from(processed)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
            ],
        )
        .map_err(|e| RecollectError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a StoredMemory
    fn batch_to_memory(batch: &RecordBatch, row: usize, set: MemorySet) -> Result<StoredMemory> {
        let created_at = batch
            .column_by_name("created_at")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| RecollectError::Storage("Failed to get created_at column".to_string()))?
            .value(row);
        let created_at = Utc
            .timestamp_micros(created_at)
            .single()
            .ok_or_else(|| RecollectError::Storage("Invalid created_at timestamp".to_string()))?;

        Ok(StoredMemory {
            id: required_string(batch, "id", row)?,
            set,
            user_id: required_string(batch, "user_id", row)?,
            searchable_content: optional_string(batch, "searchable_content", row)?,
            summary: optional_string(batch, "summary", row)?,
            processed_data: optional_string(batch, "processed_data", row)?,
            created_at,
        })
    }

    /// Insert a single row into its set's table
    pub async fn insert(&self, memory: &StoredMemory) -> Result<()> {
        self.insert_batch(std::slice::from_ref(memory)).await
    }

    /// Insert rows, grouped by set
    pub async fn insert_batch(&self, memories: &[StoredMemory]) -> Result<()> {
        for set in MemorySet::ALL {
            let rows: Vec<&StoredMemory> = memories.iter().filter(|m| m.set == set).collect();
            if rows.is_empty() {
                continue;
            }

            let table = self.table(set)?;
            let schema = Self::schema();
            let batch = Self::memories_to_batch(&rows, schema.clone())?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            table
                .add(Box::new(batches))
                .execute()
                .await
                .map_err(|e| RecollectError::Storage(format!("Failed to insert into {set}: {e}")))?;
        }
        Ok(())
    }

    /// Rows of one set matching `filter`, newest first, capped at `limit`
    pub async fn search_set(
        &self,
        set: MemorySet,
        filter: &TextFilter,
        limit: usize,
    ) -> Result<Vec<StoredMemory>> {
        let table = self.table(set)?;

        let mut query = table.query();
        if let Some(sql_filter) = filter.to_sql_clause() {
            query = query.only_if(sql_filter);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to search {set}: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to collect {set} rows: {e}")))?;

        let mut memories = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                memories.push(Self::batch_to_memory(batch, row, set)?);
            }
        }

        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        memories.truncate(limit);
        Ok(memories)
    }

    /// Count rows in one set
    pub async fn count(&self, set: MemorySet) -> Result<usize> {
        self.table(set)?
            .count_rows(None)
            .await
            .map_err(|e| RecollectError::Storage(format!("Failed to count {set} rows: {e}")))
    }
}

#[async_trait]
impl DirectSearch for LanceStore {
    async fn search_text(
        &self,
        query: &str,
        user_id: &str,
        per_set_limit: usize,
    ) -> Result<Vec<StoredMemory>> {
        let filter = TextFilter::new().for_user(user_id).containing(query);

        let mut merged = Vec::new();
        for set in MemorySet::ALL {
            let rows = self.search_set(set, &filter, per_set_limit).await?;
            debug!("Direct store {}: {} rows for {:?}", set, rows.len(), query);
            merged.extend(rows);
        }

        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(merged)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RecollectError::Storage(format!("Failed to get {name} column")))
}

fn required_string(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
    Ok(string_column(batch, name)?.value(row).to_string())
}

fn optional_string(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<String>> {
    let column = string_column(batch, name)?;
    if column.is_null(row) {
        Ok(None)
    } else {
        Ok(Some(column.value(row).to_string()))
    }
}
