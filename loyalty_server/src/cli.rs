use std::{env, env::VarError};

/// The server has no real CLI. Any argument at all prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // The database URL can carry credentials, so it is left out.
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "LOYALTY_DB_MAX_CONNECTIONS",
        "LOYALTY_ACCRUAL_ADDRESS",
        "ACCRUAL_SYSTEM_ADDRESS",
        "LOYALTY_HTTP_TIMEOUT",
        "LOYALTY_JOB_QUEUE_SIZE",
        "LOYALTY_MAX_CONCURRENT_JOBS",
        "LOYALTY_JOB_TIMEOUT",
        "LOYALTY_POLL_INTERVAL_MS",
        "LOYALTY_RATE_LIMIT_BACKOFF_MS",
        "LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER",
        "LOYALTY_RATE_LIMIT_BACKOFF_CAP_MS",
        "LOYALTY_RATE_LIMIT_MAX_ATTEMPTS",
        "LOYALTY_TRANSPORT_RETRIES",
        "LOYALTY_TRANSPORT_BACKOFF_MS",
        "LOYALTY_RESUME_PENDING",
        "LOYALTY_STATS_INTERVAL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<40} {val:<15}");
    })
}
