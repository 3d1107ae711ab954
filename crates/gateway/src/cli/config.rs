//! `mnemo config validate` / `mnemo config show`.

use mn_domain::config::{Config, ConfigError, ConfigSeverity};

/// Print every validation issue for `config`. Returns `false` when at least
/// one issue is an error; warnings alone still pass.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    for issue in &issues {
        println!("{issue}");
    }
    let (errors, warnings) = count(&issues);
    println!("\n{errors} error(s), {warnings} warning(s) in {config_path}");
    errors == 0
}

fn count(issues: &[ConfigError]) -> (usize, usize) {
    let errors = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    (errors, issues.len() - errors)
}

/// Render the resolved config (every default filled in) as TOML.
pub fn render(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}

pub fn show(config: &Config) -> anyhow::Result<()> {
    print!("{}", render(config)?);
    Ok(())
}
