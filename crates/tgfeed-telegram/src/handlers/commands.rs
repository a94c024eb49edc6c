use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, warn};

use tgfeed_core::{commands::Caller, domain::UserId};

use crate::{router::AppState, send_html};

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        warn!(chat_id = msg.chat.id.0, "command without sender ignored");
        return Ok(());
    };

    let caller = Caller {
        user_id: UserId(user.id.0 as i64),
        handle: user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone()),
    };

    let Some(reply) = state.commands.handle(&caller, text).await else {
        return Ok(());
    };
    if let Err(e) = send_html(&bot, msg.chat.id, &reply).await {
        error!(chat_id = msg.chat.id.0, error = %e, "failed to send reply");
    }
    Ok(())
}
