use std::sync::Arc;

use clap::Parser;
use recollect::MemoryPipeline;
use recollect::backend::HttpMemoryBackend;
use recollect::config::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, truncate_string};

#[derive(Parser)]
pub struct RecentCommand {
    #[clap(
        long,
        short,
        default_value = "3",
        help = "Number of conversation turns to display"
    )]
    pub limit: usize,
}

impl RecentCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let backend = Arc::new(HttpMemoryBackend::new(&config.backend)?);
        let turns = MemoryPipeline::new(backend, config)
            .recent_history(self.limit)
            .await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&turns)?);
            }
            OutputFormat::Table => {
                if turns.is_empty() {
                    println!("No recent conversations.");
                    return Ok(());
                }

                let mut table = new_table(["When", "User", "Assistant"]);
                for turn in &turns {
                    table.add_row([
                        turn.created_at
                            .as_ref()
                            .map(format_timestamp)
                            .unwrap_or_else(|| "-".to_string()),
                        truncate_string(&turn.user_input, 60),
                        truncate_string(&turn.ai_output, 60),
                    ]);
                }
                println!("{table}");
            }
        }

        Ok(())
    }
}
