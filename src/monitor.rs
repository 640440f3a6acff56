//! Low-balance monitoring: a fixed one-minute tick walks every enabled
//! user's bindings and alerts when a balance drops below the user's
//! threshold. Per-user check intervals gate how often each binding is
//! actually queried, so the effective granularity is bounded below by
//! the tick period.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tokio::time;

use crate::bot_state::BotState;
use crate::handlers::utils::escape_markdown_v2;
use crate::models::{Binding, User};

pub async fn run_monitor(bot: Bot, state: BotState) {
    let mut interval = time::interval(Duration::from_secs(60));

    loop {
        interval.tick().await;

        if let Err(e) = monitoring_pass(&bot, &state).await {
            log::error!("❌ Monitoring pass failed: {}", e);
        }
    }
}

/// One tick: snapshot users and bindings, query every due binding,
/// alert and refresh caches. Provider failures are logged and skipped
/// without touching `last_check`, so the binding stays due and is
/// retried on the next tick.
pub async fn monitoring_pass(bot: &Bot, state: &BotState) -> sqlx::Result<()> {
    let users = User::all_enabled(&state.db.pool).await?;
    let mut bindings = group_by_user(Binding::all(&state.db.pool).await?);
    let now = Utc::now();

    for user in users {
        let Some(user_bindings) = bindings.remove(&user.id) else {
            continue;
        };

        for binding in user_bindings {
            if !binding.is_due(user.check_interval, now) {
                continue;
            }

            let rooms = match state
                .client
                .get_balance(&binding.account, &binding.customer_code)
                .await
            {
                Ok(rooms) => rooms,
                Err(e) => {
                    log::warn!(
                        "⚠️ Balance check failed for user {} account {}: {}",
                        user.id,
                        binding.account,
                        e
                    );
                    continue;
                }
            };

            for room in rooms {
                if room.balance < user.notify_threshold {
                    let text = format!(
                        "⚠️ *低电量预警\\!*\n\n\
                         🏠 房间: {}\n\
                         ⚡ 余额: `{:.2}` 度\n\
                         📉 阈值: `{:.2}` 度",
                        escape_markdown_v2(&room.room_name),
                        room.balance,
                        user.notify_threshold
                    );

                    if let Err(e) = bot
                        .send_message(ChatId(user.id), text)
                        .parse_mode(ParseMode::MarkdownV2)
                        .await
                    {
                        log::error!("Error sending alert to user {}: {}", user.id, e);
                    }
                }

                // Cache refresh happens whether or not an alert fired.
                // More than one room per binding overwrites the single
                // cache slot, last write wins.
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

    Ok(())
}

fn group_by_user(bindings: Vec<Binding>) -> HashMap<i64, Vec<Binding>> {
    let mut grouped: HashMap<i64, Vec<Binding>> = HashMap::new();
    for binding in bindings {
        grouped.entry(binding.user_id).or_default().push(binding);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn freshly_checked_binding_is_not_due_again() {
        let db = Database::memory().await;
        let stale = Utc::now() - ChronoDuration::minutes(61);
        let binding = Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, stale)
            .await
            .unwrap()
            .unwrap();

        let now = Utc::now();
        assert!(binding.is_due(60, now));

        // What a successful pass does with the binding.
        Binding::update_cache(&db.pool, binding.id, "1-101", 3.0, now)
            .await
            .unwrap();

        // An immediate second pass finds nothing due.
        let refreshed = Binding::for_user(&db.pool, 1).await.unwrap().remove(0);
        assert!(!refreshed.is_due(60, Utc::now()));
        assert_eq!(refreshed.last_balance, 3.0);
    }

    #[test]
    fn bindings_are_grouped_per_owner() {
        let now = Utc::now();
        let make = |id: i64, user_id: i64| Binding {
            id,
            user_id,
            account: format!("a{id}"),
            customer_code: "233".to_string(),
            room_name: String::new(),
            last_balance: 0.0,
            last_check: now,
        };

        let grouped = group_by_user(vec![make(1, 7), make(2, 7), make(3, 8)]);
        assert_eq!(grouped[&7].len(), 2);
        assert_eq!(grouped[&8].len(), 1);
        assert!(!grouped.contains_key(&9));
    }
}
