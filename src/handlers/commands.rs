use teloxide::prelude::*;
use std::error::Error;

use crate::bot_state::BotState;
use crate::dialogue::DialogueState;
use crate::handlers::utils::main_menu_keyboard;
use crate::models::User;

use crate::Command;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cmd {
        Command::Start => handle_start(bot, msg, state).await?,
        Command::Help => handle_help(bot, msg).await?,
    }
    Ok(())
}

async fn handle_start(
    bot: Bot,
    msg: Message,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_id = msg.chat.id;

    // First contact creates the user row with default settings; /start
    // also bails out of any half-finished workflow.
    User::get_or_create(&state.db.pool, chat_id.0).await?;
    state.dialogues.set_state(chat_id, DialogueState::Idle).await;

    bot.send_message(
        chat_id,
        "欢迎使用完美校园电费监控机器人！\n请通过下方菜单进行操作。",
    )
    .reply_markup(main_menu_keyboard())
    .await?;

    Ok(())
}

async fn handle_help(bot: Bot, msg: Message) -> Result<(), Box<dyn Error + Send + Sync>> {
    bot.send_message(
        msg.chat.id,
        "📖 使用说明\n\n\
         /start - 显示主菜单\n\
         /help - 显示本帮助\n\n\
         菜单功能：\n\
         🔌 查询电量 - 立即查询所有绑定账号的余额\n\
         👤 账号管理 - 绑定或解绑校园账号\n\
         ⚙️ 预警设置 - 低电量预警的阈值、检查间隔与开关\n\n\
         开启预警后，余额低于阈值时会自动推送提醒。",
    )
    .await?;

    Ok(())
}
