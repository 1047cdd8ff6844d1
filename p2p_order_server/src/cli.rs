use std::{env, env::VarError};

/// There's no real CLI for the server or the worker, so just do quick 'n dirty
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
    const DISPLAY_ENVS: [&str; 10] = [
        "RUST_LOG",
        "P2P_HOST",
        "P2P_PORT",
        "P2P_DATABASE_URL",
        "P2P_ESCROW_SERVICE_URL",
        "P2P_BUMP_POLL_INTERVAL",
        "P2P_EXPIRY_POLL_INTERVAL",
        "P2P_DEFAULT_ORDER_TTL",
        "P2P_EVENT_BUFFER_SIZE",
        "P2P_RUN_EMBEDDED_WORKERS",
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
