//! `supportline onboard`: First-time setup.

use anyhow::Result;
use supportline_config::AppConfig;

const SAMPLE_FAQS: &str = r#"[
  {
    "question": "store hours",
    "answer": "We are open 9-5 Mon-Fri",
    "keywords": ["opening hours", "open"]
  },
  {
    "question": "How do I reset my password?",
    "answer": "Use the 'Forgot password' link on the sign-in page and follow the email we send you.",
    "keywords": ["password", "locked out"]
  },
  {
    "question": "What is your refund policy?",
    "answer": "Refunds are available within 30 days of purchase.",
    "keywords": ["refund", "money back"]
  }
]
"#;

pub async fn run() -> Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Supportline, first-time setup");
    println!("=============================\n");

    if config_dir.exists() {
        println!("  Config directory exists: {}", config_dir.display());
    } else {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    }

    let config = AppConfig::default();
    let faq_path = std::path::PathBuf::from(&config.faq.path);
    if faq_path.exists() {
        println!("  FAQ file exists: {}", faq_path.display());
    } else {
        std::fs::write(&faq_path, SAMPLE_FAQS)?;
        println!("  Created sample FAQ file: {}", faq_path.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("   1. Set GEMINI_API_KEY or add api_key to {}", config_path.display());
        println!("   2. Edit {} with your own questions", faq_path.display());
        println!("   3. Run: supportline chat\n");
    }

    Ok(())
}
