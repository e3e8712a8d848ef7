use anyhow::Result;
use travelpilot::agents::{Agent, AgentFactory, AgentSettings, DefaultAgentFactory};
use travelpilot::config::Config;

/// Build one agent, answer one prompt, print the answer
pub async fn run(prompt: &str) -> Result<()> {
    crate::logging::setup_logging(Some("ask"))?;

    let settings = AgentSettings::from_config(Config::global())?;
    let agent = DefaultAgentFactory::new(settings).create().await?;
    let answer = agent.run(prompt).await?;

    println!("{}", answer);
    Ok(())
}
