//! Model listing functionality

use crate::cli::context::AppContext;
use crate::core::providers::{AVAILABLE_MODELS, DEFAULT_MODEL};

pub fn list_models(context: &AppContext) {
    let current = context.model();

    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    for model in AVAILABLE_MODELS {
        let mut tags = Vec::new();
        if model.id == DEFAULT_MODEL {
            tags.push("default");
        }
        if model.id == current {
            tags.push("selected");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        println!("  • {}{tags}", model.name);
        println!("    ID: {}", model.id);
        println!("    {}", model.description);
        println!();
    }

    if !AVAILABLE_MODELS.iter().any(|model| model.id == current) {
        println!("🎯 Selected model (not in catalogue): {current}");
        println!();
    }
    println!("💡 Use 'chatline set model <id>' or '--model <id>' to choose a model");
}
