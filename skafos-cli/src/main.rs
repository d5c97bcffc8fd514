//! `skctl`: the operator-facing front-end for submitting routing rules to
//! the Skafos controller. A single `apply -f <file>` subcommand reads a
//! YAML rule file, decodes its `kind` to pick a route, and POSTs the
//! parsed rule to the controller. Exits non-zero on any validation
//! failure or non-OK response; nothing here is ever retried.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use reqwest::blocking::Client;
use skafos_core::{RatioRule, RegexRule};

#[derive(Parser)]
#[command(name = "skctl", about = "skctl controls the Skafos service mesh control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Controller address:port to submit rules to.
    #[arg(long, global = true, default_value_t = format!("localhost:{}", skafos_core::ports::CONTROLLER))]
    controller_addr: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a routing rule by filename.
    ///
    /// Examples:
    ///   skctl apply -f ./ratio.yaml
    Apply {
        /// Path to the rule file.
        #[arg(short = 'f', long = "file", required = true)]
        file: PathBuf,
    },
}

#[derive(serde::Deserialize)]
struct KindProbe {
    kind: String,
}

#[derive(serde::Deserialize)]
struct StatusResponse {
    status: i32,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Apply { file } => apply(&cli.controller_addr, file),
    }
}

/// Canonicalizes the two known rule-kind spellings on to `"ratio"` /
/// `"regex"`, accepting the deprecated `"re"` alias for regex rules.
fn canonical_kind(kind: &str) -> Option<&'static str> {
    match kind {
        "ratio" => Some("ratio"),
        "regex" | "re" => Some("regex"),
        _ => None,
    }
}

fn apply(controller_addr: &str, file: &PathBuf) -> Result<()> {
    let data = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;

    let probe: KindProbe = serde_yaml::from_str(&data).context("error decoding rule's type")?;
    let Some(kind) = canonical_kind(&probe.kind) else {
        bail!("type {} is not supported", probe.kind);
    };
    debug!("decoded rule kind: {kind} (raw: {})", probe.kind);

    let client = Client::new();
    let status = match kind {
        "ratio" => apply_ratio(&client, controller_addr, &data)?,
        _ => apply_regex(&client, controller_addr, &data)?,
    };

    if status != 0 {
        bail!("controller rejected the rule (status {status})");
    }
    info!("rule applied: status {status}");
    println!("Response status: {status} ;Rule Applied");
    Ok(())
}

fn apply_ratio(client: &Client, controller_addr: &str, data: &str) -> Result<i32> {
    let rule: RatioRule = serde_yaml::from_str(data).context("failed to parse ratio rule")?;
    rule.validate().context("invalid ratio rule")?;

    let url = format!("http://{controller_addr}/rules/ratio");
    let resp = client.post(&url).json(&rule).send().context("failed to reach controller")?;
    let resp: StatusResponse = resp.json().context("failed to parse controller response")?;
    Ok(resp.status)
}

fn apply_regex(client: &Client, controller_addr: &str, data: &str) -> Result<i32> {
    // The deprecated `kind: re` alias doesn't deserialize directly into
    // `skafos_core::Kind`, so normalize it before parsing the full rule.
    let mut value: serde_yaml::Value = serde_yaml::from_str(data).context("invalid YAML")?;
    if let Some(mapping) = value.as_mapping_mut() {
        mapping.insert(serde_yaml::Value::String("kind".into()), serde_yaml::Value::String("regex".into()));
    }
    let rule: RegexRule = serde_yaml::from_value(value).context("failed to parse regex rule")?;
    rule.validate().context("invalid regex rule: failed to compile a matcher")?;

    let url = format!("http://{controller_addr}/rules/regex");
    let resp = client.post(&url).json(&rule).send().context("failed to reach controller")?;
    let resp: StatusResponse = resp.json().context("failed to parse controller response")?;
    Ok(resp.status)
}
