use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty.
///
/// Returns true if any arguments were given, in which case the help has been printed and the server should not start.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
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
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 18] = [
        "RUST_LOG",
        "CKO_HOST",
        "CKO_PORT",
        "CKO_DATABASE_URL",
        "CKO_PRODUCTION",
        "CKO_RESERVATION_MINUTES",
        "CKO_NOTIFICATION_URL",
        "CKO_WEBHOOK_SIGNATURE_HEADER",
        "CKO_WEBHOOK_MAX_ATTEMPTS",
        "CKO_WEBHOOK_RETRY_INTERVAL_SECS",
        "CKO_WEBHOOK_PROCESSING_LEASE_SECS",
        "CKO_FINIX_BASE_URL",
        "CKO_FINIX_APPLICATION_ID",
        "CKO_FINIX_ENVIRONMENT",
        "CKO_FINIX_API_VERSION",
        "CKO_FINIX_TIMEOUT_SECS",
        "CKO_FINIX_MAX_ATTEMPTS",
        "CKO_FINIX_INITIAL_BACKOFF_MS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
