//! Terminal prompts: target database confirmation and config overwrite.

use std::io::IsTerminal;
use std::path::Path;

use dialoguer::Confirm;
use mysql_migrate::config::EXAMPLE_CONFIG;
use mysql_migrate::{Confirmation, MigrateError};

fn prompt_error(e: dialoguer::Error) -> MigrateError {
    MigrateError::Io(std::io::Error::other(e.to_string()))
}

/// How a run answers "create missing target database?".
///
/// `--yes` always creates; otherwise the user is asked when stdin is a
/// terminal, and creation is refused when it is not.
pub fn confirmation(assume_yes: bool) -> Confirmation {
    if assume_yes {
        return Confirmation::AlwaysYes;
    }
    if !std::io::stdin().is_terminal() {
        return Confirmation::AlwaysNo;
    }

    Confirmation::callback(|database| {
        Confirm::new()
            .with_prompt(format!(
                "Target database '{}' does not exist. Create it?",
                database
            ))
            .default(false)
            .interact()
            .unwrap_or(false)
    })
}

/// Write the example run document to `path`.
///
/// Returns `false` if the user chose to keep an existing file.
pub fn write_example_config(path: &Path, force: bool) -> Result<bool, MigrateError> {
    if path.exists() && !force {
        if !std::io::stdin().is_terminal() {
            return Err(MigrateError::Config(format!(
                "{} already exists; use --force to overwrite",
                path.display()
            )));
        }
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()
            .map_err(prompt_error)?;
        if !overwrite {
            return Ok(false);
        }
    }

    std::fs::write(path, EXAMPLE_CONFIG)?;
    Ok(true)
}
