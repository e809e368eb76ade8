use clap::Parser;
use recollect::MemoryPipeline;
use recollect::config::Config;
use recollect::memory::{MemoryMode, MemorySession};
use recollect::prompt::build_system_prompt;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ContextCommand {
    #[clap(help = "User message to gather memories for")]
    pub query: String,

    #[clap(long, short, help = "Memory mode (conscious, auto, combined)")]
    pub mode: Option<String>,

    #[clap(long, short, help = "User whose memories are read")]
    pub user: Option<String>,

    #[clap(
        long,
        short,
        help = "Persona text; prints the full system prompt instead of the narrative"
    )]
    pub persona: Option<String>,
}

impl ContextCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let mut session = MemorySession::from(&config.memory);
        if let Some(ref mode) = self.mode {
            session.mode = MemoryMode::parse(mode);
        }
        if let Some(ref user) = self.user {
            session.user_id = user.clone();
        }

        let pipeline = MemoryPipeline::connect(config).await?;
        let narrative = pipeline.assemble_context(&self.query, &session).await;
        let prompt = self
            .persona
            .as_deref()
            .map(|persona| build_system_prompt(persona, &narrative, pipeline.placeholder()));

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "query": self.query,
                    "mode": session.mode.as_str(),
                    "user_id": session.user_id,
                    "narrative": narrative,
                    "remembered": narrative != pipeline.placeholder(),
                    "system_prompt": prompt,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => match prompt {
                Some(prompt) => println!("{prompt}"),
                None => println!("{narrative}"),
            },
        }

        Ok(())
    }
}
