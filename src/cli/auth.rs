//! Credential management: store, remove and check the API key.

use std::error::Error;

use crate::cli::context::{AppContext, API_KEY_ENV};
use crate::core::chat_completions::CredentialStatus;

pub async fn run_auth(context: &mut AppContext, key: &str) -> Result<(), Box<dyn Error>> {
    let key = key.trim();
    if key.is_empty() {
        eprintln!("❌ API key must not be empty");
        std::process::exit(1);
    }

    println!("🔑 Checking key with {}...", context.provider_id());
    let delivery = context.delivery()?;
    match delivery
        .validate_credential(&context.provider_config_with_key(key))
        .await
    {
        CredentialStatus::Valid => {
            context.settings.set_api_key(key);
            println!("✅ API key saved");
            Ok(())
        }
        CredentialStatus::Invalid => {
            eprintln!("❌ The key was rejected; nothing was saved");
            std::process::exit(1);
        }
    }
}

pub fn run_deauth(context: &mut AppContext) {
    if context.settings.has_api_key() {
        context.settings.clear_api_key();
        println!("✅ Stored API key removed");
    } else {
        println!("No stored API key");
    }
}

pub async fn run_validate(context: &AppContext) -> Result<(), Box<dyn Error>> {
    let Some(config) = context.provider_config() else {
        eprintln!("❌ No API key configured (flag, `chatline auth`, or {API_KEY_ENV})");
        std::process::exit(1);
    };
    let delivery = context.delivery()?;
    match delivery.validate_credential(&config).await {
        CredentialStatus::Valid => {
            println!("✅ API key is valid for {}", config.provider);
            Ok(())
        }
        CredentialStatus::Invalid => {
            eprintln!("❌ API key is not valid for {}", config.provider);
            std::process::exit(1);
        }
    }
}
