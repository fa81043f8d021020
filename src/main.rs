use std::sync::Arc;

use secrecy::ExposeSecret;

use insurance_intake::bot::IntakeBot;
use insurance_intake::channels::{Channel, CliChannel, TelegramChannel};
use insurance_intake::config::BotConfig;
use insurance_intake::extraction::MindeeExtractor;
use insurance_intake::llm::create_generator;
use insurance_intake::registration::RegistrationEngine;
use insurance_intake::registration::prompts::format_price;
use insurance_intake::storage::LocalBlobStore;
use insurance_intake::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env()?;

    // Held until exit so buffered log lines are flushed
    let _log_guard = telemetry::init(&config.telemetry)?;

    eprintln!("🚗 Insurance Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Price: {}", format_price(config.price));
    eprintln!("   Files: {}", config.files_dir.display());

    if config.mindee.api_key.is_none() {
        tracing::warn!("MINDEE_API_KEY is missing; document extraction is disabled");
    }

    let generator = create_generator(&config.llm);
    let engine = Arc::new(RegistrationEngine::new(
        generator.clone(),
        Arc::new(MindeeExtractor::new(config.mindee.clone())),
        Arc::new(LocalBlobStore::new(&config.files_dir)),
        config.price,
    ));
    let bot = Arc::new(IntakeBot::new(engine, generator));

    let channel: Arc<dyn Channel> = match &config.telegram {
        Some(telegram) => {
            eprintln!("   Channel: telegram");
            let channel = TelegramChannel::new(
                telegram.bot_token.expose_secret().to_string(),
                telegram.allowed_users.clone(),
            );
            if let Err(e) = channel.health_check().await {
                anyhow::bail!("Telegram bot token rejected: {e}");
            }
            Arc::new(channel)
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN to serve Telegram)");
            eprintln!("   Type /start, press a button by number, or `photo <path>` to upload.\n");
            Arc::new(CliChannel::new())
        }
    };

    bot.run(channel).await?;
    Ok(())
}
