//! `assay doctor`: Diagnose system health.

use std::time::Duration;

use assay_config::{AppConfig, InterpreterConfig};
use tokio::process::Command;

/// How long an interpreter gets to answer `--version`.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 assay doctor: System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `assay onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured ({})", config.default_provider);
    } else {
        println!("  ❌ No API key configured: set OPENAI_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    for (lane, interpreter) in [
        ("python", &config.executor.python),
        ("r", &config.executor.r),
        ("shell", &config.executor.shell),
    ] {
        match interpreter_version(interpreter).await {
            Some(version) => println!("  ✅ {lane:<6} {} ({version})", interpreter.program),
            None => {
                println!("  ⚠️  {lane:<6} {} not found, that lane will report errors", interpreter.program);
                issues += 1;
            }
        }
    }

    if let Some(path) = &config.agent.catalog_path {
        match assay_core::catalog::ResourceCatalog::load_json(path) {
            Ok(catalog) => println!("  ✅ Catalog loaded: {} tools", catalog.tool_count()),
            Err(e) => {
                println!("  ❌ Catalog unreadable: {e}");
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// First line of `program --version`, if the program runs at all.
async fn interpreter_version(interpreter: &InterpreterConfig) -> Option<String> {
    let output = tokio::time::timeout(
        VERSION_CHECK_TIMEOUT,
        Command::new(&interpreter.program)
            .arg("--version")
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    // Some interpreters print their version on stderr.
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let first = String::from_utf8_lossy(&text).lines().next().unwrap_or("").trim().to_string();
    Some(if first.is_empty() { "version unknown".into() } else { first })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_interpreter_has_no_version() {
        let interpreter = InterpreterConfig {
            program: "assay-no-such-interpreter".into(),
            args: vec![],
        };
        assert!(interpreter_version(&interpreter).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn present_interpreter_reports_version() {
        let interpreter = InterpreterConfig {
            program: "sh".into(),
            args: vec![],
        };
        // `sh --version` may fail on minimal shells, but the program runs.
        assert!(interpreter_version(&interpreter).await.is_some());
    }
}
