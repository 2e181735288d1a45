use crate::cli::actions::Action;
use anyhow::Result;
use std::path::PathBuf;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Run {
        api_url: matches
            .get_one("api-url")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --api-url"))?,
        state_file: matches
            .get_one("state-file")
            .map(|s: &String| PathBuf::from(s))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --state-file"))?,
    })
}
