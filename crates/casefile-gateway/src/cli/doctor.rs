use casefile_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary (mirrors the reference
/// gateway's `doctor` command).
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("casefile-gateway doctor");
    println!("=======================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_document_store(config, &mut all_passed).await;
    check_runtime_endpoint(config, &mut all_passed).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_document_store(config: &Config, all_passed: &mut bool) {
    match &config.store.endpoint {
        Some(url) => {
            let reachable = match reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
            {
                Ok(client) => client.get(url).send().await.is_ok(),
                Err(_) => false,
            };
            print_check(
                "Document store reachable",
                reachable,
                if reachable {
                    url.clone()
                } else {
                    format!("{url} (unreachable)")
                },
            );
            if !reachable {
                *all_passed = false;
            }
        }
        None => {
            print_check(
                "Document store reachable",
                true,
                "DOCUMENT_STORE_ENDPOINT unset — using local JSON-file store".into(),
            );
        }
    }
}

async fn check_runtime_endpoint(config: &Config, all_passed: &mut bool) {
    match &config.bridge.runtime_endpoint {
        Some(url) => {
            let reachable = match reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
            {
                Ok(client) => client.get(url).send().await.is_ok(),
                Err(_) => false,
            };
            print_check(
                "Agent runtime reachable",
                reachable,
                if reachable {
                    url.clone()
                } else {
                    format!("{url} (unreachable)")
                },
            );
            if !reachable {
                *all_passed = false;
            }
        }
        None => {
            print_check(
                "Agent runtime reachable",
                false,
                "bridge.runtime_endpoint unset — falling back to localhost dev endpoint".into(),
            );
            *all_passed = false;
        }
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
