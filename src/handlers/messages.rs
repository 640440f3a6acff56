use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use std::error::Error;

use chrono::Utc;

use crate::bot_state::BotState;
use crate::dialogue::{DialogueState, SCRATCH_ACCOUNT};
use crate::handlers::utils::{
    escape_markdown_v2, escape_markdown_v2_code, send_account_list, send_settings_view,
    BTN_ACCOUNTS, BTN_QUERY, BTN_SETTINGS,
};
use crate::models::{Binding, User};

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    // Commands are already handled by the command branch.
    if text.starts_with('/') {
        return Ok(());
    }

    let chat_id = msg.chat.id;

    match text {
        BTN_QUERY => {
            state.dialogues.set_state(chat_id, DialogueState::Idle).await;
            handle_query_balance(&bot, chat_id, &state).await?;
        }
        BTN_ACCOUNTS => {
            state.dialogues.set_state(chat_id, DialogueState::Idle).await;
            send_account_list(&bot, chat_id, &state).await?;
        }
        BTN_SETTINGS => {
            state.dialogues.set_state(chat_id, DialogueState::Idle).await;
            send_settings_view(&bot, chat_id, &state).await?;
        }
        _ => handle_dialogue_input(&bot, chat_id, &state, text).await?,
    }

    Ok(())
}

/// 🔌 Live balance query over every binding. Each successful answer
/// also refreshes that binding's cache.
async fn handle_query_balance(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let bindings = Binding::for_user(&state.db.pool, chat_id.0).await?;

    if bindings.is_empty() {
        bot.send_message(chat_id, "未绑定账号。请先到“👤 账号管理”中添加账号。")
            .await?;
        return Ok(());
    }

    let waiting = bot.send_message(chat_id, "正在查询中，请稍候...").await?;

    let mut status = String::from("📊 *电量状态*:\n\n");
    for binding in &bindings {
        match state
            .client
            .get_balance(&binding.account, &binding.customer_code)
            .await
        {
            Err(e) => {
                status.push_str(&format!(
                    "❌ 账号 `{}`: 查询失败 \\({}\\)\n",
                    escape_markdown_v2_code(&binding.account),
                    escape_markdown_v2(&e.to_string())
                ));
            }
            Ok(rooms) => {
                for room in rooms {
                    status.push_str(&format!(
                        "🏠 *{}*\n⚡ 余额: `{:.2}` 度\n\n",
                        escape_markdown_v2(&room.room_name),
                        room.balance
                    ));

                    if let Err(e) = Binding::update_cache(
                        &state.db.pool,
                        binding.id,
                        &room.room_name,
                        room.balance,
                        Utc::now(),
                    )
                    .await
                    {
                        log::error!("Error refreshing binding cache: {}", e);
                    }
                }
            }
        }
    }

    // Swap the "checking" notice for the result.
    let _ = bot.delete_message(chat_id, waiting.id).await;
    bot.send_message(chat_id, status)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;

    Ok(())
}

/// Advances the per-user workflow by one step. Idle users get nothing
/// from here — their text is not part of any workflow.
async fn handle_dialogue_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    text: &str,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match state.dialogues.get_state(chat_id).await {
        DialogueState::Idle => {}

        DialogueState::AwaitingAccount => {
            state
                .dialogues
                .set_scratch(chat_id, SCRATCH_ACCOUNT, text)
                .await;
            state
                .dialogues
                .set_state(chat_id, DialogueState::AwaitingCustomerCode)
                .await;

            bot.send_message(
                chat_id,
                format!(
                    "收到账号 `{}`。\n请继续输入 *学校代码 \\(Customer Code\\)*:",
                    escape_markdown_v2_code(text)
                ),
            )
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        }

        DialogueState::AwaitingCustomerCode => {
            let account = state.dialogues.get_scratch(chat_id, SCRATCH_ACCOUNT).await;
            let code = text;

            bot.send_message(chat_id, "正在验证并绑定，请稍候...").await?;

            match state.client.get_balance(&account, code).await {
                Err(e) => {
                    // Terminal for the workflow: no retry.
                    state.dialogues.set_state(chat_id, DialogueState::Idle).await;
                    bot.send_message(chat_id, format!("❌ 验证失败: {e}\n绑定流程已取消。"))
                        .await?;
                }
                Ok(rooms) if rooms.is_empty() => {
                    state.dialogues.set_state(chat_id, DialogueState::Idle).await;
                    bot.send_message(chat_id, "❌ 未找到该账号的房间信息。绑定流程已取消。")
                        .await?;
                }
                Ok(rooms) => {
                    // Verification went through, the workflow is over
                    // either way from here.
                    state.dialogues.set_state(chat_id, DialogueState::Idle).await;

                    let room = &rooms[0];
                    let created = Binding::create(
                        &state.db.pool,
                        chat_id.0,
                        &account,
                        code,
                        &room.room_name,
                        room.balance,
                        Utc::now(),
                    )
                    .await?;

                    match created {
                        None => {
                            bot.send_message(chat_id, "⚠️ 该账号已绑定。").await?;
                        }
                        Some(_) => {
                            bot.send_message(
                                chat_id,
                                format!(
                                    "✅ *绑定成功\\!*\n🏠 房间: {}\n⚡ 当前余额: `{:.2}`",
                                    escape_markdown_v2(&room.room_name),
                                    room.balance
                                ),
                            )
                            .parse_mode(ParseMode::MarkdownV2)
                            .await?;
                        }
                    }
                }
            }
        }

        DialogueState::AwaitingThreshold => match parse_threshold(text) {
            // Invalid input keeps the state so the user can retry.
            None => {
                bot.send_message(chat_id, "❌ 输入无效，请输入数字。").await?;
            }
            Some(threshold) => {
                User::get_or_create(&state.db.pool, chat_id.0).await?;
                User::set_threshold(&state.db.pool, chat_id.0, threshold).await?;
                state.dialogues.set_state(chat_id, DialogueState::Idle).await;

                bot.send_message(chat_id, "✅ 阈值已更新。").await?;
                send_settings_view(bot, chat_id, state).await?;
            }
        },

        DialogueState::AwaitingInterval => match parse_interval(text) {
            None => {
                bot.send_message(chat_id, "❌ 输入无效，请输入大于0的整数。")
                    .await?;
            }
            Some(minutes) => {
                User::get_or_create(&state.db.pool, chat_id.0).await?;
                User::set_interval(&state.db.pool, chat_id.0, minutes).await?;
                state.dialogues.set_state(chat_id, DialogueState::Idle).await;

                bot.send_message(chat_id, "✅ 检查间隔已更新。").await?;
                send_settings_view(bot, chat_id, state).await?;
            }
        },
    }

    Ok(())
}

fn parse_threshold(input: &str) -> Option<f64> {
    input.trim().parse().ok()
}

/// Check interval in minutes, must be at least 1.
fn parse_interval(input: &str) -> Option<i64> {
    input.trim().parse().ok().filter(|minutes| *minutes >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_accepts_decimals_and_rejects_garbage() {
        assert_eq!(parse_threshold("7.5"), Some(7.5));
        assert_eq!(parse_threshold(" 10 "), Some(10.0));
        assert_eq!(parse_threshold("abc"), None);
        assert_eq!(parse_threshold(""), None);
    }

    #[test]
    fn interval_requires_a_positive_integer() {
        assert_eq!(parse_interval("45"), Some(45));
        assert_eq!(parse_interval("1"), Some(1));
        assert_eq!(parse_interval("0"), None);
        assert_eq!(parse_interval("-5"), None);
        assert_eq!(parse_interval("2.5"), None);
        assert_eq!(parse_interval("abc"), None);
    }
}
