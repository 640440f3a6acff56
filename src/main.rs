use teloxide::{prelude::*, utils::command::BotCommands};
use std::env;

mod bot_state;
mod database;
mod dialogue;
mod handlers;
mod models;
mod monitor;
mod wanxiao;

use crate::bot_state::BotState;
use crate::database::Database;
use crate::handlers::{callback_handler, command_handler, message_handler};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "可用命令:")]
enum Command {
    #[command(description = "开始使用并显示主菜单")]
    Start,
    #[command(description = "显示帮助")]
    Help,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting wanxiao electricity bot...");

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:wanxiao.db?mode=rwc".to_string());

    let db = Database::new(&database_url).await?;
    db.init().await?;
    log::info!("✅ Database initialized");

    let state = BotState::new(db);
    let bot = Bot::from_env();

    // Monitoring tick fires once a minute; per-user check intervals are
    // enforced inside the pass itself.
    let monitor_bot = bot.clone();
    let monitor_state = state.clone();
    tokio::spawn(async move {
        monitor::run_monitor(monitor_bot, monitor_state).await;
    });

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_message().endpoint(message_handler));

    log::info!("🚀 Starting dispatcher...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
