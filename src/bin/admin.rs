use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use expense_auth::auth::{ApiKeyValidator, TokenConfig};
use expense_auth::keys::{
    generate_signing_secret, CommandRestart, ExternalKeyProvider, HttpInvalidator, HttpProbe,
    KeyKind, KeyProvider, RotationController, SecretValue,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

fn print_help() {
    eprintln!(
        "\
expense-auth-admin

USAGE:
  expense-auth-admin <command> [options]

COMMANDS:
  generate-key                    Print a new random API key
  rotate-api-key                  Replace the API key file and verify the service accepts it
  rotate-signing-secret           Replace the signing secret file and verify it
  check-keys                      Load every configured key source and report status

generate-key OPTIONS:
  --signing-secret                Generate a signing secret instead of an API key

rotate-api-key / rotate-signing-secret OPTIONS:
  --file <path>                   (defaults to env API_KEY_FILE / SIGNING_SECRET_FILE)
  --value <secret>                (optional) New value; generated when omitted
  --base-url <url>                (defaults to env EXPENSE_AUTH_URL, then {DEFAULT_BASE_URL})
  --admin-key <key>               (optional) API key with api.admin for the reload call
                                  (defaults to the current API key)

rotate-signing-secret OPTIONS:
  --restart-command <cmd>         (required, defaults to env RESTART_COMMAND) Run after a
                                  successful rotation, e.g. \"systemctl restart expense-auth\"

ENV (check-keys):
  API_KEY_FILE / API_KEY / API_KEY_FALLBACK
  SIGNING_SECRET_FILE / JWT_SECRET / JWT_SECRET_FALLBACK
"
    );
}

fn take_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_key_file(path: &PathBuf) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Credentials the reload call can authenticate with, most likely first
fn admin_keys(explicit: Option<String>, extra: &[Option<String>]) -> Vec<SecretValue> {
    let mut keys: Vec<String> = Vec::new();
    let candidates = std::iter::once(explicit)
        .chain(extra.iter().cloned())
        .chain(std::iter::once(env_non_empty("API_KEY")))
        .chain(std::iter::once(
            env_non_empty("API_KEY_FILE").and_then(|p| read_key_file(&PathBuf::from(p))),
        ));

    for candidate in candidates.flatten() {
        if !keys.contains(&candidate) {
            keys.push(candidate);
        }
    }
    keys.into_iter().map(SecretValue::from).collect()
}

struct RotateArgs {
    file: Option<PathBuf>,
    value: Option<String>,
    base_url: String,
    admin_key: Option<String>,
    restart_command: Option<String>,
}

fn parse_rotate_args(
    args: &mut VecDeque<String>,
    allow_restart: bool,
) -> anyhow::Result<Option<RotateArgs>> {
    let mut parsed = RotateArgs {
        file: None,
        value: None,
        base_url: env_non_empty("EXPENSE_AUTH_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        admin_key: None,
        restart_command: if allow_restart {
            env_non_empty("RESTART_COMMAND")
        } else {
            None
        },
    };

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--file" => parsed.file = Some(PathBuf::from(take_value(args, "--file")?)),
            "--value" => parsed.value = Some(take_value(args, "--value")?),
            "--base-url" => parsed.base_url = take_value(args, "--base-url")?,
            "--admin-key" => parsed.admin_key = Some(take_value(args, "--admin-key")?),
            "--restart-command" if allow_restart => {
                parsed.restart_command = Some(take_value(args, "--restart-command")?)
            }
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    Ok(Some(parsed))
}

async fn rotate(kind: KeyKind, args: RotateArgs) -> anyhow::Result<()> {
    let file_var = match kind {
        KeyKind::ApiKey => "API_KEY_FILE",
        KeyKind::SigningSecret => "SIGNING_SECRET_FILE",
    };
    if kind == KeyKind::SigningSecret && args.restart_command.is_none() {
        anyhow::bail!(
            "rotate-signing-secret needs --restart-command or RESTART_COMMAND: \
             tokens signed with the old secret stop validating once it is replaced"
        );
    }

    let path = args
        .file
        .or_else(|| env_non_empty(file_var).map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("{file_var} is required (or pass --file)"))?;

    let new_value = match args.value {
        Some(v) => v,
        None => match kind {
            KeyKind::ApiKey => ApiKeyValidator::generate_key(),
            KeyKind::SigningSecret => generate_signing_secret(),
        },
    };

    // During an API key rotation the service may already be on the new key
    let previous = read_key_file(&path);
    let extra = match kind {
        KeyKind::ApiKey => vec![Some(new_value.clone()), previous],
        KeyKind::SigningSecret => Vec::new(),
    };
    let invalidator = HttpInvalidator::new(args.base_url.clone(), admin_keys(args.admin_key, &extra));
    let probe = HttpProbe::new(args.base_url, TokenConfig::from_env());

    let mut controller = RotationController::new(Arc::new(invalidator), Arc::new(probe));
    if let Some(command) = args.restart_command.as_deref() {
        let hook = CommandRestart::parse(command)
            .ok_or_else(|| anyhow::anyhow!("empty restart command"))?;
        controller = controller.with_restart(Arc::new(hook));
    }

    let outcome = controller.rotate(kind, &path, &new_value).await?;

    println!("ok: {} rotated", outcome.kind);
    println!("file: {}", path.display());
    if let Some(backup) = &outcome.backup {
        println!("backup: {}", backup.display());
    }
    println!("fingerprint: {}", outcome.fingerprint);
    if outcome.restarted {
        println!("restart: done");
    }
    if kind == KeyKind::ApiKey {
        println!("api_key: {new_value}");
    }
    Ok(())
}

fn check_keys() -> anyhow::Result<()> {
    let provider = ExternalKeyProvider::from_env();
    let mut failures = 0;

    for kind in [KeyKind::ApiKey, KeyKind::SigningSecret] {
        if !provider.is_configured(kind) {
            println!("{kind}: not configured");
            continue;
        }

        if let Err(e) = provider.refresh_kind(kind) {
            println!("{kind}: primary source failed: {e}");
        }

        match provider.current(kind) {
            Ok(value) => println!(
                "{kind}: ok (fingerprint {})",
                ApiKeyValidator::fingerprint(value.expose())
            ),
            Err(e) => {
                failures += 1;
                println!("{kind}: unavailable: {e}");
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&provider.status())?);

    if failures > 0 {
        anyhow::bail!("{failures} configured key(s) could not be loaded");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "generate-key" => {
            let mut signing_secret = false;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--signing-secret" => signing_secret = true,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            if signing_secret {
                println!("{}", generate_signing_secret());
            } else {
                println!("{}", ApiKeyValidator::generate_key());
            }
            Ok(())
        }
        "rotate-api-key" => match parse_rotate_args(&mut args, false)? {
            Some(parsed) => rotate(KeyKind::ApiKey, parsed).await,
            None => Ok(()),
        },
        "rotate-signing-secret" => match parse_rotate_args(&mut args, true)? {
            Some(parsed) => rotate(KeyKind::SigningSecret, parsed).await,
            None => Ok(()),
        },
        "check-keys" => check_keys(),
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
