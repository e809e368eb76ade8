use clap::Parser;
use recollect::MemoryPipeline;
use recollect::config::Config;
use recollect::memory::ConversationTurn;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table};

#[derive(Parser)]
pub struct CommitCommand {
    #[clap(help = "What the user said")]
    pub user_input: String,

    #[clap(help = "What the assistant answered")]
    pub ai_output: String,

    #[clap(long, default_value = "unknown", help = "Model that produced the answer")]
    pub model: String,
}

impl CommitCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let pipeline = MemoryPipeline::connect(config).await?;
        let turn = ConversationTurn::new(&self.user_input, &self.ai_output, &self.model);

        let result = pipeline.commit_turn(&turn).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "chat_id": result.chat_id.as_str(),
                    "confirmed": result.confirmed,
                    "waited_ms": result.waited.as_millis() as u64,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = new_table(["Field", "Value"]);
                table.add_row(["Chat ID", result.chat_id.as_str()]);
                table.add_row([
                    "Status",
                    if result.confirmed {
                        "confirmed"
                    } else {
                        "not yet visible"
                    },
                ]);
                table.add_row(["Waited", &format!("{:.1}s", result.waited.as_secs_f64())]);
                println!("{table}");

                if !result.confirmed {
                    println!(
                        "\nThe turn was recorded but memory processing may still be running."
                    );
                }
            }
        }

        Ok(())
    }
}
