use clap::{Parser, Subcommand};
use recollect::config::Config;
use recollect::storage::{DirectSearch, LanceStore, MemorySet, StoredMemory};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, truncate_string};

#[derive(Parser)]
pub struct StoreCommand {
    #[clap(subcommand)]
    pub command: StoreSubcommand,
}

#[derive(Subcommand)]
pub enum StoreSubcommand {
    #[clap(about = "Add a row to the direct store")]
    Add(AddArgs),

    #[clap(about = "Search the direct store by substring")]
    Search(SearchArgs),

    #[clap(about = "Show row counts per set")]
    Stats,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory text")]
    pub text: String,

    #[clap(long, help = "Store in the long-term set instead of short-term")]
    pub long_term: bool,

    #[clap(long, short, help = "Owner of the row (defaults to the configured user)")]
    pub user: Option<String>,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Text to look for")]
    pub query: String,

    #[clap(long, short, help = "Owner of the rows (defaults to the configured user)")]
    pub user: Option<String>,

    #[clap(long, short, help = "Maximum rows per set (defaults to the configured limit)")]
    pub limit: Option<usize>,
}

impl StoreCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let store = LanceStore::open(&config.store.data_dir).await?;

        match &self.command {
            StoreSubcommand::Add(args) => Self::add(&store, config, args, format).await,
            StoreSubcommand::Search(args) => Self::search(&store, config, args, format).await,
            StoreSubcommand::Stats => Self::stats(&store, format).await,
        }
    }

    async fn add(
        store: &LanceStore,
        config: &Config,
        args: &AddArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let text = args.text.trim();
        if text.is_empty() {
            return Err("Memory text must not be empty".into());
        }

        let set = if args.long_term {
            MemorySet::LongTerm
        } else {
            MemorySet::ShortTerm
        };
        let user_id = args.user.as_deref().unwrap_or(&config.memory.user_id);
        let memory = StoredMemory::new(set, user_id).with_searchable_content(text);

        store.insert(&memory).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": memory.id,
                    "set": set.table_name(),
                    "user_id": memory.user_id,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Added {} to {}", memory.id, set);
            }
        }

        Ok(())
    }

    async fn search(
        store: &LanceStore,
        config: &Config,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let user_id = args.user.as_deref().unwrap_or(&config.memory.user_id);
        let limit = args.limit.unwrap_or(config.store.per_set_limit);
        let rows = store.search_text(&args.query, user_id, limit).await?;
        let max_chars = config.retrieval.content_max_chars;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = rows
                    .iter()
                    .map(|row| {
                        serde_json::json!({
                            "id": row.id,
                            "set": row.set.table_name(),
                            "text": row.display_text(max_chars),
                            "created_at": row.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if rows.is_empty() {
                    println!("No matching rows.");
                    return Ok(());
                }

                let mut table = new_table(["Created", "Set", "Text"]);
                for row in &rows {
                    table.add_row([
                        format_timestamp(&row.created_at),
                        row.set.to_string(),
                        truncate_string(&row.display_text(max_chars).unwrap_or_default(), 80),
                    ]);
                }
                println!("{table}");
            }
        }

        Ok(())
    }

    async fn stats(store: &LanceStore, format: OutputFormat) -> CliResult<()> {
        let short_term = store.count(MemorySet::ShortTerm).await?;
        let long_term = store.count(MemorySet::LongTerm).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "total_rows": short_term + long_term,
                    "by_set": {
                        "short_term_memory": short_term,
                        "long_term_memory": long_term,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Direct Store Statistics");
                println!("=======================\n");

                let mut table = new_table(["Set", "Rows"]);
                table.add_row(["short_term_memory", &short_term.to_string()]);
                table.add_row(["long_term_memory", &long_term.to_string()]);
                println!("{table}\n");

                println!("Total: {} rows", short_term + long_term);
            }
        }

        Ok(())
    }
}
