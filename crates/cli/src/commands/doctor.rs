//! `zema doctor`: Diagnose system health.
//!
//! Runs the checks in order and stops at the first hard failure. The exit
//! status names the failing stage so scripts can branch on it.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use zema_agent::InferenceClient;
use zema_config::AppConfig;
use zema_core::provider::Provider;
use zema_providers::OllamaProvider;

use super::models::is_same_model;

const TEST_PROMPT: &str = "Say hello in one word";

/// Why the doctor gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    ServiceDown,
    ModelMissing,
    InferenceFailed,
    BadConfig,
}

impl Failure {
    pub fn exit_code(self) -> u8 {
        match self {
            Failure::ServiceDown => 1,
            Failure::ModelMissing => 2,
            Failure::InferenceFailed => 3,
            Failure::BadConfig => 4,
        }
    }
}

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("🩺 Zema Doctor — System Diagnostics");
    println!("===================================\n");

    let outcome = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid ({})", super::config_file(config_path).display());
            check(&config).await
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            Err(Failure::BadConfig)
        }
    };

    println!();
    match outcome {
        Ok(()) => {
            println!("  🎉 All checks passed!");
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            println!("  ⚠️  Doctor stopped at {failure:?}. See above for details.");
            Ok(ExitCode::from(failure.exit_code()))
        }
    }
}

/// Service, model and a live test prompt, against `config`.
pub async fn check(config: &AppConfig) -> Result<(), Failure> {
    let llm = &config.llm;
    if llm.is_loopback() {
        println!("  ✅ Service is local ({})", llm.base_url);
    } else {
        println!("  ⚠️  Service is not on this machine ({})", llm.base_url);
    }

    let provider = Arc::new(OllamaProvider::from_config(llm));

    match provider.health_check().await {
        Ok(true) => println!("  ✅ Service reachable"),
        Ok(false) | Err(_) => {
            println!("  ❌ Cannot reach the service at {}", llm.base_url);
            println!("     Start it with: ollama serve");
            return Err(Failure::ServiceDown);
        }
    }

    let installed = match provider.list_models().await {
        Ok(models) => models,
        Err(e) => {
            println!("  ❌ Could not list models: {e}");
            return Err(Failure::ServiceDown);
        }
    };
    if !installed.iter().any(|m| is_same_model(m, &llm.model)) {
        println!("  ❌ Model {} is not installed ({} available)", llm.model, installed.len());
        println!("     Pull it with: ollama pull {}", llm.model);
        return Err(Failure::ModelMissing);
    }
    println!("  ✅ Model {} installed", llm.model);

    let client = InferenceClient::new(provider, llm, &config.history);
    let started = Instant::now();
    match client.generate(TEST_PROMPT, None).await {
        Ok(answer) => {
            println!(
                "  ✅ Test prompt answered in {:.2}s: {}",
                started.elapsed().as_secs_f64(),
                answer.trim()
            );
            Ok(())
        }
        Err(e) => {
            println!("  ❌ Test prompt failed: {e}");
            Err(Failure::InferenceFailed)
        }
    }
}
