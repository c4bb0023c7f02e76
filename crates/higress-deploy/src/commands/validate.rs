//! Validate command

use crate::config::{self, Config};
use crate::{Error, Result};

/// Print the validation report and fail when any problem was found.
pub fn run(config: &Config) -> Result<()> {
    let errors = config::validate(config);
    print!("{}", config::validation_report(config, &errors));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} configuration error(s) found",
            errors.len()
        )))
    }
}
