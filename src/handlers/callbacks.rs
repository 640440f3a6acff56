use teloxide::prelude::*;
use teloxide::types::ParseMode;
use std::error::Error;

use crate::bot_state::BotState;
use crate::dialogue::DialogueState;
use crate::handlers::utils::{
    send_account_list, send_settings_view, CB_ADD_ACCOUNT, CB_SET_INTERVAL, CB_SET_THRESHOLD,
    CB_TOGGLE_ALERT, CB_UNBIND_PREFIX,
};
use crate::models::{Binding, User};

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(data) = q.data.as_deref() {
        if let Some(ref message) = q.message {
            let chat_id = message.chat().id;

            match data {
                CB_ADD_ACCOUNT => {
                    state
                        .dialogues
                        .set_state(chat_id, DialogueState::AwaitingAccount)
                        .await;

                    bot.answer_callback_query(q.id.clone()).await?;
                    bot.send_message(chat_id, "请输入 *账号* \\(学号或卡号\\):")
                        .parse_mode(ParseMode::MarkdownV2)
                        .await?;
                }

                CB_TOGGLE_ALERT => {
                    let user = User::get_or_create(&state.db.pool, chat_id.0).await?;
                    User::set_enabled(&state.db.pool, chat_id.0, !user.notify_enabled).await?;

                    send_settings_view(&bot, chat_id, &state).await?;
                    bot.answer_callback_query(q.id.clone())
                        .text("设置已更新")
                        .await?;
                }

                CB_SET_THRESHOLD => {
                    state
                        .dialogues
                        .set_state(chat_id, DialogueState::AwaitingThreshold)
                        .await;

                    bot.answer_callback_query(q.id.clone()).await?;
                    bot.send_message(chat_id, "请输入新的 *报警阈值* \\(例如 10\\):")
                        .parse_mode(ParseMode::MarkdownV2)
                        .await?;
                }

                CB_SET_INTERVAL => {
                    state
                        .dialogues
                        .set_state(chat_id, DialogueState::AwaitingInterval)
                        .await;

                    bot.answer_callback_query(q.id.clone()).await?;
                    bot.send_message(chat_id, "请输入新的 *检查间隔* \\(分钟，例如 60\\):")
                        .parse_mode(ParseMode::MarkdownV2)
                        .await?;
                }

                data if data.starts_with(CB_UNBIND_PREFIX) => {
                    let account = &data[CB_UNBIND_PREFIX.len()..];
                    let removed = Binding::delete(&state.db.pool, chat_id.0, account).await?;

                    if removed == 0 {
                        bot.answer_callback_query(q.id.clone())
                            .text("未找到绑定")
                            .await?;
                    } else {
                        bot.answer_callback_query(q.id.clone())
                            .text("解绑成功")
                            .await?;
                        send_account_list(&bot, chat_id, &state).await?;
                    }
                }

                _ => {}
            }
        }
    }

    Ok(())
}
