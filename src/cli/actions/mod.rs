pub mod run;

use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Run {
        api_url: String,
        state_file: PathBuf,
    },
}
