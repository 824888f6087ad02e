use std::net::SocketAddr;

use serde_json::json;
use taskrelay_backend_core::api::server::serve;
use taskrelay_backend_core::config::{default_app_root, resolve_settings};
use taskrelay_backend_core::tasks::variants;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("check-config") => {
            run_check_config_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
            return Ok(());
        }
        Some("list-variants") => {
            run_list_variants_cli()?;
            return Ok(());
        }
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        Some(unknown) => {
            return Err(std::io::Error::other(format!(
                "Unknown command: {unknown}\n\nUse --help for usage."
            ))
            .into());
        }
        None => {}
    }

    let settings = resolve_settings(default_app_root().as_path())?;
    let addr: SocketAddr = settings.bind.parse()?;

    serve(addr, settings).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn run_check_config_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_check_config_usage();
        return Ok(());
    }
    if let Some(unknown) = args.first() {
        return Err(std::io::Error::other(format!(
            "Unknown argument: {unknown}\n\nUse --help for usage."
        ))
        .into());
    }

    let settings = resolve_settings(default_app_root().as_path())?;
    let summary = settings.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.missing.is_empty() {
        return Err(std::io::Error::other(format!(
            "Missing required provider settings: {}",
            summary.missing.join(", ")
        ))
        .into());
    }
    Ok(())
}

fn run_list_variants_cli() -> Result<(), Box<dyn std::error::Error>> {
    let listing = variants::all()
        .iter()
        .map(|spec| {
            json!({
                "toolVariant": spec.variant,
                "submitPath": spec.submit_path,
                "requiredFields": spec.required_sources().collect::<Vec<_>>(),
                "optionalFields": spec.optional_sources().collect::<Vec<_>>(),
                "output": spec.output,
            })
        })
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn print_usage() {
    println!(
        "Usage:\n  taskrelay-backend-core                 Start the HTTP surface\n  taskrelay-backend-core check-config    Print resolved settings (secrets redacted)\n  taskrelay-backend-core list-variants   Print the tool variant registry"
    );
}

fn print_check_config_usage() {
    println!(
        "Usage: taskrelay-backend-core check-config\n\nResolves settings from the environment, .env and {} and prints a redacted summary.\nExits non-zero when the API key or webapp id is missing.",
        "config/taskrelay.settings.toml"
    );
}
