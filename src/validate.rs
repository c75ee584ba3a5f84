use wyvern_actions::ActionRegistry;
use wyvern_core::config::WyvernConfig;
use wyvern_engine::Soar;
use wyvern_store::MemoryStore;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

/// Build every configured soar against a throwaway store and report.
/// Returns the number of soars that failed to build.
pub fn run_validate(config: &WyvernConfig, registry: &ActionRegistry) -> usize {
    let checks: Vec<CheckResult> = config
        .soars
        .iter()
        .map(|soar_conf| {
            let store = MemoryStore::new();
            match Soar::new(soar_conf, registry, &store) {
                Ok(soar) => CheckResult {
                    label: soar_conf.name.clone(),
                    ok: true,
                    detail: format!(
                        "{} flaps, {} roots",
                        soar_conf.flaps.len(),
                        soar.root_ids().len()
                    ),
                },
                Err(e) => CheckResult {
                    label: soar_conf.name.clone(),
                    ok: false,
                    detail: e.to_string(),
                },
            }
        })
        .collect();

    if checks.is_empty() {
        println!("  No soars configured");
        return 0;
    }

    let mut fail_count = 0;
    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if !check.ok {
            fail_count += 1;
        }
    }

    println!();
    println!(
        "  {} valid, {} invalid",
        checks.len() - fail_count,
        fail_count
    );
    fail_count
}
