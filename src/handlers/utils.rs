use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ParseMode,
    ReplyMarkup,
};

use crate::bot_state::BotState;
use crate::models::{Binding, User};

// Reply-keyboard main menu.
pub const BTN_QUERY: &str = "🔌 查询电量";
pub const BTN_ACCOUNTS: &str = "👤 账号管理";
pub const BTN_SETTINGS: &str = "⚙️ 预警设置";

// Callback payloads. Unbind carries the account after the prefix.
pub const CB_ADD_ACCOUNT: &str = "add_account";
pub const CB_TOGGLE_ALERT: &str = "toggle_alert";
pub const CB_SET_THRESHOLD: &str = "set_threshold";
pub const CB_SET_INTERVAL: &str = "set_interval";
pub const CB_UNBIND_PREFIX: &str = "unbind:";

/// Escapes everything MarkdownV2 treats as markup.
pub fn escape_markdown_v2(text: &str) -> String {
    let specials = [
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
        '\\',
    ];
    let mut out = String::with_capacity(text.len() * 2);

    for ch in text.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Inside a MarkdownV2 code span only the backtick and the backslash
/// need escaping.
pub fn escape_markdown_v2_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);

    for ch in text.chars() {
        if ch == '`' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn main_menu_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(
        KeyboardMarkup::new(vec![
            vec![KeyboardButton::new(BTN_QUERY)],
            vec![
                KeyboardButton::new(BTN_ACCOUNTS),
                KeyboardButton::new(BTN_SETTINGS),
            ],
        ])
        .resize_keyboard(),
    )
}

pub fn settings_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📉 修改阈值", CB_SET_THRESHOLD),
            InlineKeyboardButton::callback("⏱️ 修改间隔", CB_SET_INTERVAL),
        ],
        vec![InlineKeyboardButton::callback("🔔 开关预警", CB_TOGGLE_ALERT)],
    ])
}

pub fn account_list_keyboard(bindings: &[Binding]) -> InlineKeyboardMarkup {
    let mut keyboard = vec![vec![InlineKeyboardButton::callback(
        "➕ 添加账号",
        CB_ADD_ACCOUNT,
    )]];

    for binding in bindings {
        keyboard.push(vec![InlineKeyboardButton::callback(
            format!("❌ 解绑 {}", binding.account),
            format!("{CB_UNBIND_PREFIX}{}", binding.account),
        )]);
    }

    InlineKeyboardMarkup::new(keyboard)
}

/// ⚙️ Settings summary plus its inline keyboard. Creates the user row
/// on the fly for someone who opens settings before anything else.
pub async fn send_settings_view(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let user = User::get_or_create(&state.db.pool, chat_id.0).await?;

    let text = format!(
        "⚙️ *预警设置*:\n\n\
         📉 报警阈值: `{:.2}` 度\n\
         🔔 预警开关: `{}`\n\
         ⏱️ 检查间隔: `{}` 分钟",
        user.notify_threshold, user.notify_enabled, user.check_interval
    );

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(settings_keyboard())
        .await?;

    Ok(())
}

/// 📋 Account list plus add/unbind buttons.
pub async fn send_account_list(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bindings = Binding::for_user(&state.db.pool, chat_id.0).await?;

    let mut text = String::from("📋 *账号列表*:\n");
    if bindings.is_empty() {
        text.push_str("暂无绑定账号。\n");
    }
    for binding in &bindings {
        text.push_str(&format!(
            "\\- `{}` \\({}\\)\n",
            escape_markdown_v2_code(&binding.account),
            escape_markdown_v2(&binding.room_name)
        ));
    }

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(account_list_keyboard(&bindings))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_telegram_markup_characters() {
        assert_eq!(escape_markdown_v2("a.b-c!"), "a\\.b\\-c\\!");
        assert_eq!(escape_markdown_v2("南苑1栋101"), "南苑1栋101");
        assert_eq!(escape_markdown_v2("(x)"), "\\(x\\)");
    }

    #[test]
    fn code_span_escape_only_touches_backtick_and_backslash() {
        assert_eq!(escape_markdown_v2_code("a.b-c!"), "a.b-c!");
        assert_eq!(escape_markdown_v2_code("a`b\\c"), "a\\`b\\\\c");
    }
}
