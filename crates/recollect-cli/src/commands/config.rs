use clap::{Parser, Subcommand};
use recollect::config::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the effective configuration")]
    Show {
        #[clap(long, help = "Print as TOML, ready to save as a config file")]
        toml: bool,
    },
}

impl ConfigCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show { toml } => Self::show(config, *toml, format),
        }
    }

    fn show(config: &Config, toml: bool, format: OutputFormat) -> CliResult<()> {
        if toml {
            print!("{}", config.to_toml()?);
            return Ok(());
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Table => {
                for (section, rows) in sections(config) {
                    println!("[{section}]");
                    let mut table = new_table(["Setting", "Value"]);
                    for (key, value) in rows {
                        table.add_row([key, value.as_str()]);
                    }
                    println!("{table}\n");
                }
            }
        }

        Ok(())
    }
}

type Section = (&'static str, Vec<(&'static str, String)>);

fn sections(config: &Config) -> Vec<Section> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".to_string());
    let retrieval = &config.retrieval;

    vec![
        (
            "Memory",
            vec![
                ("mode", config.memory.mode.as_str().to_string()),
                ("user_id", config.memory.user_id.clone()),
                ("assistant_id", optional(&config.memory.assistant_id)),
                ("session_id", optional(&config.memory.session_id)),
            ],
        ),
        (
            "Retrieval",
            vec![
                ("context_limit", retrieval.context_limit.to_string()),
                ("history_limit", retrieval.history_limit.to_string()),
                ("supplement_threshold", retrieval.supplement_threshold.to_string()),
                ("min_items", retrieval.min_items.to_string()),
                ("dialogue_stop", retrieval.dialogue_stop.to_string()),
                ("dynamic_limit", retrieval.dynamic_limit.to_string()),
                ("combined_raw_cap", retrieval.combined_raw_cap.to_string()),
                ("source_timeout_ms", retrieval.source_timeout_ms.to_string()),
            ],
        ),
        (
            "Narrative",
            vec![
                ("placeholder", config.narrative.placeholder.clone()),
                ("max_items", config.narrative.max_items.to_string()),
                ("merge_cap", config.merge.cap.to_string()),
            ],
        ),
        (
            "Commit",
            vec![
                ("settle_delay_ms", config.commit.settle_delay_ms.to_string()),
                ("poll_interval_ms", config.commit.poll_interval_ms.to_string()),
                ("poll_budget_ms", config.commit.poll_budget_ms.to_string()),
            ],
        ),
        (
            "Backend",
            vec![
                ("base_url", config.backend.base_url.clone()),
                ("timeout_secs", config.backend.timeout_secs.to_string()),
                ("api_key_env", optional(&config.backend.api_key_env)),
                ("indexing_agent", config.backend.indexing_agent.to_string()),
                ("search_enabled", config.backend.search_enabled.to_string()),
                (
                    "auto_ingest_enabled",
                    config.backend.auto_ingest_enabled.to_string(),
                ),
            ],
        ),
        (
            "Store",
            vec![
                ("enabled", config.store.enabled.to_string()),
                ("data_dir", config.store.data_dir.display().to_string()),
                ("per_set_limit", config.store.per_set_limit.to_string()),
            ],
        ),
    ]
}
