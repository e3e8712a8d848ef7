use std::path::PathBuf;

use anyhow::{bail, Result};
use travelpilot::agents::AgentSettings;
use travelpilot::config::Config;

#[derive(Debug, PartialEq)]
pub enum Check {
    ApiKey { length: Option<usize> },
    Command {
        extension: String,
        command: String,
        path: Option<PathBuf>,
    },
}

impl Check {
    pub fn passed(&self) -> bool {
        match self {
            Check::ApiKey { length } => length.is_some(),
            Check::Command { path, .. } => path.is_some(),
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::ApiKey { length: Some(length) } => {
                write!(f, "GOOGLE_API_KEY is set (length {})", length)
            }
            Check::ApiKey { length: None } => write!(f, "GOOGLE_API_KEY is not set"),
            Check::Command {
                extension,
                command,
                path: Some(path),
            } => write!(f, "{}: `{}` found at {}", extension, command, path.display()),
            Check::Command {
                extension,
                command,
                path: None,
            } => write!(f, "{}: `{}` not found on PATH", extension, command),
        }
    }
}

pub fn checks(settings: &AgentSettings) -> Vec<Check> {
    let mut checks = vec![Check::ApiKey {
        length: settings.api_key.as_ref().map(|key| key.len()),
    }];
    checks.extend(settings.extensions.iter().map(|extension| Check::Command {
        extension: extension.name().to_string(),
        command: extension.command().to_string(),
        path: which::which(extension.command()).ok(),
    }));
    checks
}

pub fn run() -> Result<()> {
    let settings = AgentSettings::from_config(Config::global())?;
    let checks = checks(&settings);

    for check in &checks {
        let mark = if check.passed() { "ok  " } else { "FAIL" };
        println!("[{}] {}", mark, check);
    }

    let failed = checks.iter().filter(|check| !check.passed()).count();
    if failed > 0 {
        bail!("{} check(s) failed", failed);
    }
    Ok(())
}
